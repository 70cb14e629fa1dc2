//! Reporting API HTTP Client
//!
//! Issues authenticated GETs against the `data/ga` endpoint and maps Google
//! API error bodies onto [`Error::Query`]. Nothing is retried.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ReportingClient {
    client: Client,
    base_url: String,
}

impl ReportingClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make an authenticated GET request against the reporting endpoint
    pub async fn get(&self, query: &[(&str, String)], access_token: &str) -> Result<Value> {
        let builder = self
            .client
            .get(&self.base_url)
            .query(query)
            .bearer_auth(access_token);

        self.execute_request(builder).await
    }

    /// Execute a request and handle Google API response patterns
    async fn execute_request(&self, builder: RequestBuilder) -> Result<Value> {
        let response = builder
            .send()
            .await
            .map_err(|e| Error::query(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        debug!("Response status: {}", status);

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limited by Google API");
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::query(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = match serde_json::from_str::<Value>(&body) {
                Ok(parsed) => extract_error_message(&parsed, status),
                Err(_) if body.trim().is_empty() => format!("HTTP {} error", status),
                Err(_) => body.trim().to_string(),
            };
            error!("Google API error: {}", message);
            return Err(Error::query_status(status.as_u16(), message));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::query(format!("Failed to parse JSON response: {}", e)))
    }
}

/// Extract error message from Google API error response
fn extract_error_message(response: &Value, status: StatusCode) -> String {
    // {
    //   "error": {
    //     "code": 400,
    //     "message": "Invalid dimension or metric: ga:foo",
    //     "errors": [...]
    //   }
    // }
    if let Some(message) = response
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
    {
        return message.to_string();
    }

    format!("HTTP {} error", status)
}
