//! Error Types
//!
//! Everything the connector and the query runner can fail with. Errors are
//! surfaced to the caller as-is: there is no retry and no partial result.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Keyfile missing or malformed, or the OAuth exchange was rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Invalid payload, vendor-side rejection, or an unusable response.
    #[error("{}", render_query(.status, .message))]
    Query {
        status: Option<u16>,
        message: String,
    },

    /// Settings file unreadable or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

fn render_query(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("query failed (HTTP {}): {}", code, message),
        None => format!("query failed: {}", message),
    }
}

impl Error {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            status: None,
            message: message.into(),
        }
    }

    pub fn query_status(status: u16, message: impl Into<String>) -> Self {
        Self::Query {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// HTTP status reported by the vendor, if the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Query { status, .. } => *status,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
