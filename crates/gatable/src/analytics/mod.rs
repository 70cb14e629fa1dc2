//! Query Runner
//!
//! Runs a payload against a view, follows pagination to the end of the
//! result set and hands back either a typed [`ResultTable`] or the merged
//! [`RawReport`].

pub mod client;
pub mod paginate;
pub mod payload;
pub mod response;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::auth::CredentialProvider;
use crate::config::{Settings, DEFAULT_API_BASE_URL, DEFAULT_TIMEOUT_SECS};
use crate::error::{Error, Result};
use crate::http::create_http_client;
use crate::table::ResultTable;

use self::client::ReportingClient;
use self::paginate::PageSource;

pub use payload::{QueryPayload, QueryPayloadBuilder, SamplingLevel, DEFAULT_MAX_RESULTS, MAX_RESULTS_CAP};
pub use response::{ColumnHeader, ColumnType, RawReport, ReportPage};

/// Analytics view (profile) id, normalised to the `ga:<id>` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewId(String);

impl ViewId {
    pub fn parse(raw: &str) -> Result<Self> {
        let id = raw.trim();
        let id = id.strip_prefix("ga:").unwrap_or(id);
        if id.is_empty() {
            return Err(Error::query("View id is empty"));
        }
        Ok(Self(format!("ga:{}", id)))
    }

    /// The `ids` request parameter
    pub fn as_ids(&self) -> &str {
        &self.0
    }
}

impl FromStr for ViewId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<u64> for ViewId {
    fn from(id: u64) -> Self {
        Self(format!("ga:{}", id))
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Table,
    Raw,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Table(ResultTable),
    Raw(RawReport),
}

/// Authorized handle on the reporting API.
#[derive(Clone)]
pub struct AnalyticsService {
    client: ReportingClient,
    credentials: Arc<dyn CredentialProvider>,
}

impl fmt::Debug for AnalyticsService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyticsService")
            .field("base_url", &self.client.base_url())
            .field("credentials", &self.credentials.name())
            .finish()
    }
}

impl AnalyticsService {
    /// Service against the public endpoint with default timeouts.
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let http = create_http_client(DEFAULT_TIMEOUT_SECS)?;
        Ok(Self::from_parts(credentials, http, DEFAULT_API_BASE_URL))
    }

    pub fn with_settings(credentials: Arc<dyn CredentialProvider>, settings: &Settings) -> Result<Self> {
        let http = create_http_client(settings.timeout_secs())?;
        Ok(Self::from_parts(credentials, http, settings.api_base_url()))
    }

    pub fn from_parts(
        credentials: Arc<dyn CredentialProvider>,
        http: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: ReportingClient::new(http, base_url),
            credentials,
        }
    }

    pub fn credentials(&self) -> &dyn CredentialProvider {
        self.credentials.as_ref()
    }

    /// Fetch a single page starting at `start_index`.
    pub async fn fetch_page(&self, view: &ViewId, payload: &QueryPayload, start_index: u64) -> Result<ReportPage> {
        let token = self.credentials.access_token().await?;
        let query = payload.to_query(view.as_ids(), start_index);
        let response = self.client.get(&query, &token).await?;

        serde_json::from_value(response)
            .map_err(|e| Error::query(format!("Unexpected report shape: {}", e)))
    }

    /// Run a query and return every page merged, untyped.
    pub async fn run_query_raw(&self, view: &ViewId, payload: &QueryPayload) -> Result<RawReport> {
        info!(
            "Querying {} from {} to {} ({} metrics, {} dimensions, {} rows per page)",
            view,
            payload.start_date(),
            payload.end_date(),
            payload.metrics().len(),
            payload.dimensions().len(),
            payload.page_size()
        );

        let source = ViewPages {
            service: self,
            view,
            payload,
        };
        let report = paginate::fetch_all(&source, u64::from(payload.start_index().unwrap_or(1))).await?;

        info!(
            "Fetched {} rows of {} in {} page(s)",
            report.rows.len(),
            report.total_results,
            report.pages_fetched
        );
        Ok(report)
    }

    /// Run a query and return the typed table.
    pub async fn run_query(&self, view: &ViewId, payload: &QueryPayload) -> Result<ResultTable> {
        let report = self.run_query_raw(view, payload).await?;
        Ok(ResultTable::from_report(&report))
    }

    pub async fn run_query_as(&self, view: &ViewId, payload: &QueryPayload, mode: OutputMode) -> Result<QueryOutput> {
        match mode {
            OutputMode::Table => self.run_query(view, payload).await.map(QueryOutput::Table),
            OutputMode::Raw => self.run_query_raw(view, payload).await.map(QueryOutput::Raw),
        }
    }
}

/// Pages of one payload against one view
struct ViewPages<'a> {
    service: &'a AnalyticsService,
    view: &'a ViewId,
    payload: &'a QueryPayload,
}

#[async_trait]
impl PageSource for ViewPages<'_> {
    async fn fetch_page(&self, start_index: u64) -> Result<ReportPage> {
        self.service.fetch_page(self.view, self.payload, start_index).await
    }
}
