//! Query Payload
//!
//! Typed form of the Core Reporting API query parameters, validated when it
//! is built. Metric and dimension names are passed through untouched.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Vendor page size when `max-results` is not set
pub const DEFAULT_MAX_RESULTS: u32 = 1000;
/// Largest page the vendor serves
pub const MAX_RESULTS_CAP: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplingLevel {
    Default,
    Faster,
    HigherPrecision,
}

impl SamplingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Faster => "FASTER",
            Self::HigherPrecision => "HIGHER_PRECISION",
        }
    }
}

/// Deserializing goes through [`QueryPayloadBuilder::build`], so a stored
/// payload is checked exactly like a built one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "QueryPayloadBuilder")]
pub struct QueryPayload {
    start_date: String,
    end_date: String,
    metrics: Vec<String>,
    dimensions: Vec<String>,
    sort: Option<String>,
    filters: Option<String>,
    segment: Option<String>,
    sampling_level: Option<SamplingLevel>,
    max_results: Option<u32>,
    start_index: Option<u32>,
}

impl QueryPayload {
    pub fn builder(start_date: impl Into<String>, end_date: impl Into<String>) -> QueryPayloadBuilder {
        QueryPayloadBuilder {
            start_date: start_date.into(),
            end_date: end_date.into(),
            ..Default::default()
        }
    }

    pub fn start_date(&self) -> &str {
        &self.start_date
    }

    pub fn end_date(&self) -> &str {
        &self.end_date
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    /// Page size the vendor will actually use.
    pub fn page_size(&self) -> u32 {
        self.max_results.unwrap_or(DEFAULT_MAX_RESULTS)
    }

    pub fn start_index(&self) -> Option<u32> {
        self.start_index
    }

    /// Request parameters for one page, with `ids` and `start-index` set.
    pub fn to_query(&self, ids: &str, start_index: u64) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("ids", ids.to_string()),
            ("start-date", self.start_date.clone()),
            ("end-date", self.end_date.clone()),
            ("metrics", self.metrics.join(",")),
            ("dimensions", self.dimensions.join(",")),
        ];

        if let Some(sort) = &self.sort {
            query.push(("sort", sort.clone()));
        }
        if let Some(filters) = &self.filters {
            query.push(("filters", filters.clone()));
        }
        if let Some(segment) = &self.segment {
            query.push(("segment", segment.clone()));
        }
        if let Some(level) = self.sampling_level {
            query.push(("samplingLevel", level.as_str().to_string()));
        }
        if let Some(max) = self.max_results {
            query.push(("max-results", max.to_string()));
        }
        query.push(("start-index", start_index.to_string()));

        query
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryPayloadBuilder {
    start_date: String,
    end_date: String,
    metrics: Vec<String>,
    dimensions: Vec<String>,
    sort: Option<String>,
    filters: Option<String>,
    segment: Option<String>,
    sampling_level: Option<SamplingLevel>,
    max_results: Option<u32>,
    start_index: Option<u32>,
}

impl QueryPayloadBuilder {
    pub fn metric(mut self, metric: impl Into<String>) -> Self {
        self.metrics.push(metric.into());
        self
    }

    pub fn metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics.extend(metrics.into_iter().map(Into::into));
        self
    }

    pub fn dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimensions.push(dimension.into());
        self
    }

    pub fn dimensions<I, S>(mut self, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimensions.extend(dimensions.into_iter().map(Into::into));
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn filters(mut self, filters: impl Into<String>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = Some(segment.into());
        self
    }

    pub fn sampling_level(mut self, level: SamplingLevel) -> Self {
        self.sampling_level = Some(level);
        self
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn start_index(mut self, start_index: u32) -> Self {
        self.start_index = Some(start_index);
        self
    }

    pub fn build(self) -> Result<QueryPayload> {
        let metrics = split_identifiers(&self.metrics);
        let dimensions = split_identifiers(&self.dimensions);

        if metrics.is_empty() {
            return Err(Error::query("At least one metric is required"));
        }
        if dimensions.is_empty() {
            return Err(Error::query("At least one dimension is required"));
        }

        let start = parse_date("start date", &self.start_date)?;
        let end = parse_date("end date", &self.end_date)?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(Error::query(format!(
                    "Start date {} is after end date {}",
                    self.start_date, self.end_date
                )));
            }
        }

        if let Some(max) = self.max_results {
            if max == 0 || max > MAX_RESULTS_CAP {
                return Err(Error::query(format!(
                    "max_results must be between 1 and {}, got {}",
                    MAX_RESULTS_CAP, max
                )));
            }
        }

        if self.start_index == Some(0) {
            return Err(Error::query("start_index is 1-based"));
        }

        Ok(QueryPayload {
            start_date: self.start_date.trim().to_string(),
            end_date: self.end_date.trim().to_string(),
            metrics,
            dimensions,
            sort: non_blank(self.sort),
            filters: non_blank(self.filters),
            segment: non_blank(self.segment),
            sampling_level: self.sampling_level,
            max_results: self.max_results,
            start_index: self.start_index,
        })
    }
}

impl TryFrom<QueryPayloadBuilder> for QueryPayload {
    type Error = Error;

    fn try_from(builder: QueryPayloadBuilder) -> Result<Self> {
        builder.build()
    }
}

/// Accept both single identifiers and comma-joined lists such as
/// `"ga:sessions, ga:pageviews"`.
fn split_identifiers(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Validate a vendor date. Returns the calendar date for absolute dates and
/// `None` for relative ones (`today`, `yesterday`, `NdaysAgo`).
fn parse_date(label: &str, value: &str) -> Result<Option<NaiveDate>> {
    let value = value.trim();

    if value == "today" || value == "yesterday" {
        return Ok(None);
    }
    if let Some(days) = value.strip_suffix("daysAgo") {
        if !days.is_empty() && days.chars().all(|c| c.is_ascii_digit()) {
            return Ok(None);
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| {
            Error::query(format!(
                "Invalid {} '{}': expected YYYY-MM-DD, today, yesterday or NdaysAgo",
                label, value
            ))
        })
}
