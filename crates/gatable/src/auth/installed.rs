//! Installed-Application OAuth Flow
//!
//! PKCE authorization-code flow with a loopback redirect. The browser is
//! opened on the consent page, a one-shot listener on `127.0.0.1:<random>`
//! receives the code, and the resulting tokens go to the [`TokenCache`] so the
//! consent step is only needed once per client.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::keyfile::ClientSecrets;
use super::oauth::{
    generate_code_challenge, generate_code_verifier, generate_state, is_token_expiring,
    parse_token_response, post_form, ANALYTICS_READONLY_SCOPE,
};
use super::store::{TokenCache, TokenRecord};
use super::CredentialProvider;
use crate::error::{Error, Result};

/// Seconds of validity below which a token is refreshed before use
const EXPIRY_MARGIN_SECS: i64 = 60;
/// How long to wait for the browser redirect
const CONSENT_TIMEOUT_SECS: u64 = 120;

pub struct InstalledAppFlow {
    secrets: ClientSecrets,
    scopes: Vec<String>,
    cache: TokenCache,
    interactive: bool,
    http: reqwest::Client,
    current: Mutex<Option<TokenRecord>>,
}

impl InstalledAppFlow {
    pub fn new(secrets: ClientSecrets, cache: TokenCache, http: reqwest::Client) -> Self {
        Self {
            secrets,
            scopes: vec![ANALYTICS_READONLY_SCOPE.to_string()],
            cache,
            interactive: true,
            http,
            current: Mutex::new(None),
        }
    }

    /// Allow or forbid the browser consent step.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.secrets.client_id, self.scopes.join(" "))
    }

    /// Build the consent URL for the PKCE flow.
    pub fn authorize_url(&self, state: &str, code_challenge: &str, redirect_uri: &str) -> String {
        let scope_str = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&code_challenge={}&code_challenge_method=S256&access_type=offline&prompt=consent",
            self.secrets.auth_uri,
            urlencoding::encode(&self.secrets.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope_str),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
        )
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str, redirect_uri: &str) -> Result<TokenRecord> {
        info!("Exchanging authorization code for tokens");

        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let body = post_form(&self.http, &self.secrets.token_uri, &params).await?;
        let tokens = parse_token_response(&body)?;
        Ok(TokenRecord::from_tokens(&self.secrets.client_id, tokens))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord> {
        info!("Refreshing access token");

        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let body = post_form(&self.http, &self.secrets.token_uri, &params).await?;
        let mut tokens = parse_token_response(&body)?;
        // Google omits the refresh token on refresh responses
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }
        Ok(TokenRecord::from_tokens(&self.secrets.client_id, tokens))
    }

    /// Run the browser consent step and wait for the loopback redirect.
    async fn run_consent_flow(&self) -> Result<TokenRecord> {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::auth(format!("Failed to bind local server: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::auth(format!("Failed to get local address: {}", e)))?;

        let redirect_uri = format!("http://127.0.0.1:{}", local_addr.port());
        info!("OAuth callback server listening on {}", redirect_uri);

        let state = generate_state();
        let auth_url = self.authorize_url(&state, &code_challenge, &redirect_uri);

        info!("Opening browser for OAuth authorization");
        if let Err(e) = open::that(&auth_url) {
            warn!("Failed to open browser automatically: {}", e);
            eprintln!("Open this URL in a browser to authorize access:\n\n{}\n", auth_url);
        }

        let code = timeout(
            Duration::from_secs(CONSENT_TIMEOUT_SECS),
            wait_for_code(&listener, &state),
        )
        .await
        .map_err(|_| Error::auth(format!("OAuth flow timed out after {} seconds", CONSENT_TIMEOUT_SECS)))??;

        self.exchange_code(&code, &code_verifier, &redirect_uri).await
    }

    fn store(&self, record: &TokenRecord) {
        if let Err(e) = self.cache.save(&self.cache_key(), record) {
            warn!("Could not cache token: {}", e);
        }
    }

    async fn obtain(&self) -> Result<TokenRecord> {
        let key = self.cache_key();

        if let Some(cached) = self.cache.load(&key) {
            if !is_token_expiring(cached.expiry, EXPIRY_MARGIN_SECS) {
                debug!("Using cached access token");
                return Ok(cached);
            }

            if let Some(refresh_token) = cached.refresh_token.as_deref() {
                match self.refresh(refresh_token).await {
                    Ok(record) => {
                        self.store(&record);
                        return Ok(record);
                    }
                    Err(e) => warn!("Token refresh failed, falling back to consent: {}", e),
                }
            }
        }

        if !self.interactive {
            return Err(Error::auth(
                "No usable cached token and interactive consent is disabled",
            ));
        }

        let record = self.run_consent_flow().await?;
        self.store(&record);
        info!("OAuth consent completed");
        Ok(record)
    }
}

#[async_trait]
impl CredentialProvider for InstalledAppFlow {
    fn name(&self) -> &str {
        "installed"
    }

    async fn access_token(&self) -> Result<String> {
        let mut current = self.current.lock().await;

        if let Some(record) = current.as_ref() {
            if !is_token_expiring(record.expiry, EXPIRY_MARGIN_SECS) {
                return Ok(record.access_token.clone());
            }
        }

        let record = self.obtain().await?;
        let token = record.access_token.clone();
        *current = Some(record);
        Ok(token)
    }
}

// ── Loopback Helpers ────────────────────────────────────────────────────────

async fn wait_for_code(listener: &TcpListener, expected_state: &str) -> Result<String> {
    loop {
        let (mut socket, _) = listener
            .accept()
            .await
            .map_err(|e| Error::auth(format!("Callback server error: {}", e)))?;

        let mut request_line = String::new();
        {
            let mut reader = BufReader::new(&mut socket);
            reader
                .read_line(&mut request_line)
                .await
                .map_err(|e| Error::auth(format!("Callback server error: {}", e)))?;
        }

        match parse_callback(&request_line, expected_state) {
            Callback::Ignored => continue,
            Callback::Code(code) => {
                send_response(&mut socket, "200 OK", "Authentication successful. You can close this tab.").await;
                return Ok(code);
            }
            Callback::Failed(message) => {
                send_response(&mut socket, "400 Bad Request", &format!("Authentication failed: {}", message)).await;
                return Err(Error::auth(message));
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum Callback {
    Code(String),
    Failed(String),
    Ignored,
}

/// Interpret the request line of a redirect hitting the loopback listener.
fn parse_callback(request_line: &str, expected_state: &str) -> Callback {
    // "GET /path?query HTTP/1.1"
    let Some(path_and_query) = request_line.split_whitespace().nth(1) else {
        return Callback::Ignored;
    };

    let query = path_and_query
        .split_once('?')
        .map(|(_, q)| q)
        .unwrap_or("");
    let params = parse_query_params(query);

    if let Some(error) = params.get("error") {
        let desc = params
            .get("error_description")
            .map(String::as_str)
            .unwrap_or("Unknown error");
        return Callback::Failed(format!("{}: {}", error, desc));
    }

    match (params.get("code"), params.get("state")) {
        (Some(_), Some(state)) if state != expected_state => {
            Callback::Failed("State mismatch on OAuth redirect".to_string())
        }
        (Some(code), Some(_)) => Callback::Code(code.clone()),
        _ => Callback::Ignored,
    }
}

/// Parse URL query parameters into a HashMap
fn parse_query_params(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            let decoded = urlencoding::decode(value).ok()?;
            Some((key.to_string(), decoded.into_owned()))
        })
        .collect()
}

async fn send_response(socket: &mut TcpStream, status: &str, message: &str) {
    let html = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>gatable</title></head><body><p>{}</p></body></html>",
        message
    );
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        html.len(),
        html
    );
    if let Err(e) = socket.write_all(response.as_bytes()).await {
        debug!("Failed to answer OAuth redirect: {}", e);
    }
    if let Err(e) = socket.flush().await {
        debug!("Failed to flush OAuth redirect response: {}", e);
    }
}
