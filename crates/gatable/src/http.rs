//! HTTP Client Utilities
//!
//! Shared reqwest client creation with consistent configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Create a reqwest HTTP client with the given request timeout
///
/// Connect timeout is fixed at 10 seconds. A zero timeout would fail every
/// request, so it is rejected as a configuration error.
pub fn create_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    if timeout_secs == 0 {
        return Err(Error::Config("timeout_secs must be at least 1".into()));
    }

    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))
}
