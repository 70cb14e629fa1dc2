//! Service-Account Flow
//!
//! Two-legged OAuth: an RS256-signed JWT assertion built from the keyfile's
//! private key is exchanged at the token endpoint for a short-lived access
//! token. No browser, no cache on disk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::keyfile::ServiceAccountKey;
use super::oauth::{base64_url_encode, is_token_expiring, parse_token_response, post_form, OAuthTokens, ANALYTICS_READONLY_SCOPE};
use super::CredentialProvider;
use crate::error::{Error, Result};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_MARGIN_SECS: i64 = 60;

pub struct ServiceAccountFlow {
    key: ServiceAccountKey,
    key_pair: RsaKeyPair,
    scopes: Vec<String>,
    http: reqwest::Client,
    current: Mutex<Option<OAuthTokens>>,
}

impl ServiceAccountFlow {
    /// Parse the PEM private key up front so a broken keyfile fails here.
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Result<Self> {
        let der = decode_pem(&key.private_key)?;
        let key_pair = RsaKeyPair::from_pkcs8(&der)
            .map_err(|e| Error::auth(format!("Service account private key rejected: {}", e)))?;

        Ok(Self {
            key,
            key_pair,
            scopes: vec![ANALYTICS_READONLY_SCOPE.to_string()],
            http,
            current: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Build the signed `header.claims.signature` assertion.
    pub fn build_assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let mut header = json!({ "alg": "RS256", "typ": "JWT" });
        if let Some(kid) = &self.key.private_key_id {
            header["kid"] = json!(kid);
        }

        let issued_at = now.timestamp();
        let claims = json!({
            "iss": self.key.client_email,
            "scope": self.scopes.join(" "),
            "aud": self.key.token_uri,
            "iat": issued_at,
            "exp": issued_at + ASSERTION_LIFETIME_SECS,
        });

        let signing_input = format!(
            "{}.{}",
            base64_url_encode(header.to_string().as_bytes()),
            base64_url_encode(claims.to_string().as_bytes()),
        );

        let rng = SystemRandom::new();
        let mut signature = vec![0u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(&RSA_PKCS1_SHA256, &rng, signing_input.as_bytes(), &mut signature)
            .map_err(|_| Error::auth("Failed to sign service account assertion"))?;

        Ok(format!("{}.{}", signing_input, base64_url_encode(&signature)))
    }

    async fn fetch_token(&self) -> Result<OAuthTokens> {
        info!("Requesting access token for {}", self.key.client_email);

        let assertion = self.build_assertion(Utc::now())?;
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];

        let body = post_form(&self.http, &self.key.token_uri, &params).await?;
        parse_token_response(&body)
    }
}

#[async_trait]
impl CredentialProvider for ServiceAccountFlow {
    fn name(&self) -> &str {
        "service_account"
    }

    async fn access_token(&self) -> Result<String> {
        let mut current = self.current.lock().await;

        if let Some(tokens) = current.as_ref() {
            if !is_token_expiring(tokens.expiry, EXPIRY_MARGIN_SECS) {
                return Ok(tokens.access_token.clone());
            }
            debug!("Service account token expiring, requesting a new one");
        }

        let tokens = self.fetch_token().await?;
        let access_token = tokens.access_token.clone();
        *current = Some(tokens);
        Ok(access_token)
    }
}

/// Strip the PEM armour and decode the base64 body to DER.
fn decode_pem(pem: &str) -> Result<Vec<u8>> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect();

    if body.is_empty() {
        return Err(Error::auth("Service account private key is empty"));
    }

    STANDARD
        .decode(body.as_bytes())
        .map_err(|e| Error::auth(format!("Service account private key is not valid PEM: {}", e)))
}
