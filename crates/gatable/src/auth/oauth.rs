//! OAuth2 Token Endpoint Helpers
//!
//! Form posting, token-response parsing and the PKCE utilities shared by the
//! installed-application and service-account flows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{Error, Result};

/// Read-only access to Analytics reporting data
pub const ANALYTICS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/analytics.readonly";

/// Tokens returned from an OAuth token exchange or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expiry: DateTime<Utc>,
    pub scopes: Vec<String>,
}

// ── HTTP utilities ──────────────────────────────────────────────────────────

/// POST a form-encoded request to a token endpoint and return the body.
///
/// A rejected exchange is reported with the endpoint's `error_description`
/// when one is present.
pub(crate) async fn post_form(
    client: &reqwest::Client,
    url: &str,
    params: &[(&str, &str)],
) -> Result<String> {
    let response = client
        .post(url)
        .form(params)
        .send()
        .await
        .map_err(|e| Error::auth(format!("Token request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::auth(format!("Failed to read token response: {}", e)))?;

    if !status.is_success() {
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|parsed| {
                parsed
                    .get("error_description")
                    .or_else(|| parsed.get("error"))
                    .and_then(|v| v.as_str())
                    .map(String::from)
            })
            .unwrap_or(body);
        error!("Token endpoint returned HTTP {}: {}", status, detail);
        return Err(Error::auth(format!("Token endpoint rejected the request (HTTP {}): {}", status, detail)));
    }

    Ok(body)
}

/// Parse a Google OAuth2 token response.
pub(crate) fn parse_token_response(body: &str) -> Result<OAuthTokens> {
    let parsed: serde_json::Value =
        serde_json::from_str(body).map_err(|e| Error::auth(format!("Invalid token response: {}", e)))?;

    if let Some(err) = parsed.get("error").and_then(|v| v.as_str()) {
        let desc = parsed
            .get("error_description")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error");
        return Err(Error::auth(format!("{}: {}", err, desc)));
    }

    let access_token = parsed
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::auth("Missing access_token in token response"))?
        .to_string();

    let refresh_token = parsed
        .get("refresh_token")
        .and_then(|v| v.as_str())
        .map(String::from);

    let token_type = parsed
        .get("token_type")
        .and_then(|v| v.as_str())
        .unwrap_or("Bearer")
        .to_string();

    let expires_in = parsed
        .get("expires_in")
        .and_then(|v| v.as_i64())
        .unwrap_or(3600);

    let scopes = parsed
        .get("scope")
        .and_then(|v| v.as_str())
        .map(|s| s.split(' ').map(String::from).collect())
        .unwrap_or_default();

    Ok(OAuthTokens {
        access_token,
        refresh_token,
        token_type,
        expiry: Utc::now() + Duration::seconds(expires_in),
        scopes,
    })
}

/// Check whether a token expires within `margin_secs` of now.
pub(crate) fn is_token_expiring(expiry: DateTime<Utc>, margin_secs: i64) -> bool {
    expiry.signed_duration_since(Utc::now()).num_seconds() < margin_secs
}

// ── PKCE Utilities ──────────────────────────────────────────────────────────

/// Generate a PKCE code verifier (43-128 characters of unreserved URI characters).
pub fn generate_code_verifier() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64_url_encode(&bytes)
}

/// Derive the PKCE code challenge from a code verifier using S256.
pub fn generate_code_challenge(verifier: &str) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(verifier.as_bytes());
    base64_url_encode(&hash)
}

/// Random state string for CSRF protection on the redirect.
pub fn generate_state() -> String {
    use rand::Rng;
    let bytes: [u8; 16] = rand::rngs::OsRng.gen();
    hex::encode(bytes)
}

/// Base64url encoding (no padding) per RFC 4648 §5.
pub(crate) fn base64_url_encode(data: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(data)
}
