//! Token Cache
//!
//! File-based cache for installed-application tokens at `~/.gatable/tokens/`.
//! One JSON file per client and scope set; filenames are a SHA-256 prefix of
//! the cache key so client ids never appear on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::oauth::OAuthTokens;
use crate::error::{Error, Result};

const TOKEN_EXT: &str = "json";

/// Cached token (plaintext form)
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct TokenRecord {
    #[zeroize(skip)]
    pub client_id: String,
    #[zeroize(skip)]
    pub token_type: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[zeroize(skip)]
    pub expiry: DateTime<Utc>,
    #[serde(default)]
    #[zeroize(skip)]
    pub scopes: Vec<String>,
    #[zeroize(skip)]
    pub issued_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn from_tokens(client_id: &str, tokens: OAuthTokens) -> Self {
        Self {
            client_id: client_id.to_string(),
            token_type: tokens.token_type,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expiry: tokens.expiry,
            scopes: tokens.scopes,
            issued_at: Utc::now(),
        }
    }
}

// Custom Debug implementation that redacts sensitive fields
impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("client_id", &self.client_id)
            .field("token_type", &self.token_type)
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TokenCache {
    dir: PathBuf,
}

impl TokenCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(token_file_name(key))
    }

    /// Load a cached token. Unreadable or corrupt entries count as a miss.
    pub fn load(&self, key: &str) -> Option<TokenRecord> {
        let path = self.path_for(key);
        if !path.exists() {
            return None;
        }

        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to read cached token {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&data) {
            Ok(record) => {
                debug!("Loaded cached token from {}", path.display());
                Some(record)
            }
            Err(e) => {
                warn!("Ignoring corrupt token cache {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, key: &str, record: &TokenRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::auth(format!("Failed to create token cache dir: {}", e)))?;

        let path = self.path_for(key);
        let data = serde_json::to_string_pretty(record)
            .map_err(|e| Error::auth(format!("Failed to serialize token: {}", e)))?;

        fs::write(&path, data)
            .map_err(|e| Error::auth(format!("Failed to write token cache: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::auth(format!("Failed to restrict token cache permissions: {}", e)))?;
        }

        debug!("Cached token at {}", path.display());
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| Error::auth(format!("Failed to remove cached token: {}", e)))?;
        }
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// First 8 bytes of SHA-256 over the cache key, hex encoded.
fn token_file_name(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    format!("{}.{}", hex::encode(&hash[..8]), TOKEN_EXT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_record() -> TokenRecord {
        TokenRecord {
            client_id: "client-1".into(),
            token_type: "Bearer".into(),
            access_token: "ya29.cached".into(),
            refresh_token: Some("1//refresh".into()),
            expiry: Utc::now() + Duration::hours(1),
            scopes: vec!["scope".into()],
            issued_at: Utc::now(),
        }
    }

    #[test]
    fn test_deterministic_file_name() {
        assert_eq!(token_file_name("client-1:scope"), token_file_name("client-1:scope"));
        assert_ne!(token_file_name("client-1:scope"), token_file_name("client-2:scope"));
        assert!(token_file_name("client-1:scope").ends_with(".json"));
        assert!(!token_file_name("client-1:scope").contains("client"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("tokens"));

        cache.save("client-1:scope", &sample_record()).unwrap();
        let loaded = cache.load("client-1:scope").unwrap();
        assert_eq!(loaded.access_token, "ya29.cached");
        assert_eq!(loaded.refresh_token.as_deref(), Some("1//refresh"));
        assert!(cache.load("other:scope").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_cache_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path());
        cache.save("k", &sample_record()).unwrap();

        let mode = fs::metadata(cache.path_for("k")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path());
        fs::write(cache.path_for("k"), "garbage").unwrap();
        assert!(cache.load("k").is_none());
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path());
        cache.save("k", &sample_record()).unwrap();
        cache.remove("k").unwrap();
        assert!(cache.load("k").is_none());
        cache.remove("k").unwrap();
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", sample_record());
        assert!(!rendered.contains("ya29.cached"));
        assert!(!rendered.contains("1//refresh"));
    }
}
