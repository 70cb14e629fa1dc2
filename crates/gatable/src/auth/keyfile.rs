//! Credential Keyfiles
//!
//! Google hands out two JSON keyfile shapes: OAuth client secrets for
//! installed applications (`{"installed": {...}}`) and service-account keys
//! (`{"type": "service_account", ...}`). The shape decides the flow.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// OAuth client registered as a desktop ("installed") or web application.
#[derive(Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ClientSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecrets")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// Service-account key as downloaded from the Cloud Console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Keyfile {
    Installed(ClientSecrets),
    ServiceAccount(ServiceAccountKey),
}

impl Keyfile {
    /// Read and classify a keyfile from disk.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::auth(format!("Keyfile not found: {}", path.display())));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::auth(format!("Failed to read keyfile {}: {}", path.display(), e)))?;

        debug!("Loaded keyfile {}", path.display());
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let parsed: Value = serde_json::from_str(content)
            .map_err(|e| Error::auth(format!("Keyfile is not valid JSON: {}", e)))?;

        if parsed.get("type").and_then(|v| v.as_str()) == Some("service_account") {
            let key: ServiceAccountKey = serde_json::from_value(parsed)
                .map_err(|e| Error::auth(format!("Malformed service account key: {}", e)))?;
            return Ok(Self::ServiceAccount(key));
        }

        let client = parsed.get("installed").or_else(|| parsed.get("web")).cloned();
        match client {
            Some(section) => {
                let secrets: ClientSecrets = serde_json::from_value(section)
                    .map_err(|e| Error::auth(format!("Malformed client secrets: {}", e)))?;
                Ok(Self::Installed(secrets))
            }
            None => Err(Error::auth(
                "Unrecognised keyfile: expected an \"installed\" client or a service account key",
            )),
        }
    }
}
