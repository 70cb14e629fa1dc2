//! Connector
//!
//! Turns a credential keyfile into an authorized [`AnalyticsService`]. The
//! keyfile shape picks the flow: installed-application clients go through the
//! browser consent step (once, then the token cache), service accounts sign a
//! JWT. Automated environments that already hold an access token can skip
//! both with [`StaticToken`].

pub mod installed;
pub mod keyfile;
pub mod oauth;
pub mod service_account;
pub mod store;

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use zeroize::Zeroizing;

use crate::analytics::AnalyticsService;
use crate::config::Settings;
use crate::error::Result;
use crate::http::create_http_client;

pub use installed::InstalledAppFlow;
pub use keyfile::{ClientSecrets, Keyfile, ServiceAccountKey};
pub use oauth::{OAuthTokens, ANALYTICS_READONLY_SCOPE};
pub use service_account::ServiceAccountFlow;
pub use store::{TokenCache, TokenRecord};

/// Source of bearer tokens for the reporting API.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Flow name (e.g. "installed")
    fn name(&self) -> &str;

    /// A currently valid access token, refreshed or re-issued as needed.
    async fn access_token(&self) -> Result<String>;
}

/// Pre-issued access token, for environments without a consent step.
pub struct StaticToken {
    token: Zeroizing<String>,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
        }
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticToken").field("token", &"[REDACTED]").finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    fn name(&self) -> &str {
        "static"
    }

    async fn access_token(&self) -> Result<String> {
        Ok(self.token.to_string())
    }
}

/// Build the credential provider matching a keyfile.
pub fn credentials_from_keyfile(
    keyfile_path: &Path,
    settings: &Settings,
    http: reqwest::Client,
) -> Result<Arc<dyn CredentialProvider>> {
    match Keyfile::load(keyfile_path)? {
        Keyfile::Installed(secrets) => {
            let cache = TokenCache::new(settings.token_cache_dir()?);
            let flow = InstalledAppFlow::new(secrets, cache, http).interactive(settings.interactive());
            Ok(Arc::new(flow))
        }
        Keyfile::ServiceAccount(key) => {
            let flow = ServiceAccountFlow::new(key, http)?;
            info!("Using service account {}", flow.client_email());
            Ok(Arc::new(flow))
        }
    }
}

/// Delete the cached token for an installed-application keyfile.
///
/// Returns the removed cache file, or `None` for service accounts, which
/// never cache to disk.
pub fn forget_cached_token(keyfile_path: impl AsRef<Path>, settings: &Settings) -> Result<Option<PathBuf>> {
    let secrets = match Keyfile::load(keyfile_path.as_ref())? {
        Keyfile::Installed(secrets) => secrets,
        Keyfile::ServiceAccount(_) => return Ok(None),
    };

    let http = create_http_client(settings.timeout_secs())?;
    let flow = InstalledAppFlow::new(secrets, TokenCache::new(settings.token_cache_dir()?), http);
    let key = flow.cache_key();
    let path = flow.cache().path_for(&key);

    flow.cache().remove(&key)?;
    info!("Removed cached token {}", path.display());
    Ok(Some(path))
}

/// Authenticate with a keyfile using settings from `~/.gatable/config.json`.
pub async fn connect(keyfile_path: impl AsRef<Path>) -> Result<AnalyticsService> {
    let settings = Settings::load()?;
    connect_with(keyfile_path, &settings).await
}

/// Authenticate with a keyfile and explicit settings.
///
/// The first token exchange happens here, so a bad keyfile or a rejected
/// exchange fails now rather than on the first query.
pub async fn connect_with(keyfile_path: impl AsRef<Path>, settings: &Settings) -> Result<AnalyticsService> {
    let keyfile_path = keyfile_path.as_ref();
    let http = create_http_client(settings.timeout_secs())?;
    let credentials = credentials_from_keyfile(keyfile_path, settings, http.clone())?;

    credentials.access_token().await?;
    info!(
        "Authenticated with {} credentials from {}",
        credentials.name(),
        keyfile_path.display()
    );

    Ok(AnalyticsService::from_parts(credentials, http, settings.api_base_url()))
}
