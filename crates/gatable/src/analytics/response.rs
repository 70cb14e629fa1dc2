//! Report Responses
//!
//! Wire shape of a Core Reporting API page and the merged report assembled
//! from all pages of a query.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Dimension,
    Metric,
}

/// One entry of `columnHeaders`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    pub name: String,
    pub column_type: ColumnType,
    /// Vendor type tag: STRING, INTEGER, FLOAT, CURRENCY, PERCENT, TIME
    pub data_type: String,
}

/// One page as returned by `data/ga`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPage {
    #[serde(default)]
    pub column_headers: Vec<ColumnHeader>,
    /// Absent when the query matched nothing
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub items_per_page: Option<u64>,
    #[serde(default)]
    pub next_link: Option<String>,
    #[serde(default)]
    pub profile_info: Option<Value>,
    #[serde(default)]
    pub totals_for_all_results: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub contains_sampled_data: Option<bool>,
    #[serde(default)]
    pub query: Option<Value>,
}

/// Every page of a query merged: metadata from the first page, rows from all
/// of them in fetch order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReport {
    pub column_headers: Vec<ColumnHeader>,
    pub rows: Vec<Vec<String>>,
    pub total_results: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_per_page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_info: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals_for_all_results: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains_sampled_data: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    /// Requests issued to assemble this report
    pub pages_fetched: usize,
}

impl RawReport {
    /// Seed a report with the first page's metadata and rows.
    pub fn from_first_page(page: ReportPage) -> Self {
        Self {
            column_headers: page.column_headers,
            rows: page.rows,
            total_results: page.total_results,
            items_per_page: page.items_per_page,
            profile_info: page.profile_info,
            totals_for_all_results: page.totals_for_all_results,
            contains_sampled_data: page.contains_sampled_data,
            query: page.query,
            pages_fetched: 1,
        }
    }

    /// Append a follow-up page's rows. Its metadata is discarded.
    pub fn extend(&mut self, page: ReportPage) {
        self.rows.extend(page.rows);
        self.pages_fetched += 1;
    }

    pub fn column_headers(&self) -> &[ColumnHeader] {
        &self.column_headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn total_results(&self) -> u64 {
        self.total_results
    }

    pub fn items_per_page(&self) -> Option<u64> {
        self.items_per_page
    }

    /// `ceil(total / items_per_page)`; zero when nothing matched.
    pub fn total_pages(&self) -> u64 {
        match self.items_per_page {
            Some(per_page) if per_page > 0 => self.total_results.div_ceil(per_page),
            _ if self.total_results > 0 => 1,
            _ => 0,
        }
    }

    pub fn profile_info(&self) -> Option<&Value> {
        self.profile_info.as_ref()
    }

    pub fn totals_for_all_results(&self) -> Option<&BTreeMap<String, String>> {
        self.totals_for_all_results.as_ref()
    }

    pub fn contains_sampled_data(&self) -> bool {
        self.contains_sampled_data.unwrap_or(false)
    }
}
