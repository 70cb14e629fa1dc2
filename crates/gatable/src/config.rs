//! Configuration
//!
//! Settings live in `~/.gatable/config.json`. Every field is optional; a
//! missing file means defaults everywhere.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Default Core Reporting API endpoint
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/analytics/v3/data/ga";
/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default currency symbol used by formatted reports
pub const DEFAULT_CURRENCY_SYMBOL: &str = "£";

/// Get the gatable base directory (`~/.gatable/`)
pub fn gatable_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| Error::Config("Could not determine home directory".into()))?;
    Ok(home.join(".gatable"))
}

/// Get a path within the gatable directory
pub fn gatable_path(relative_path: &str) -> Result<PathBuf> {
    Ok(gatable_dir()?.join(relative_path))
}

/// Default settings file location
pub fn config_path() -> Result<PathBuf> {
    gatable_path("config.json")
}

/// Default token cache directory
pub fn default_token_cache_dir() -> Result<PathBuf> {
    gatable_path("tokens")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyfile: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Allow the browser consent step. Disable on headless machines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_symbol: Option<String>,
}

impl Settings {
    /// Load settings from the default location, falling back to defaults when
    /// the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let settings: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        if settings.timeout_secs == Some(0) {
            return Err(Error::Config(format!(
                "Invalid {}: timeout_secs must be at least 1",
                path.display()
            )));
        }
        Ok(settings)
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn interactive(&self) -> bool {
        self.interactive.unwrap_or(true)
    }

    pub fn currency_symbol(&self) -> &str {
        self.currency_symbol.as_deref().unwrap_or(DEFAULT_CURRENCY_SYMBOL)
    }

    pub fn token_cache_dir(&self) -> Result<PathBuf> {
        match &self.token_cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_token_cache_dir(),
        }
    }
}
