//! Pagination
//!
//! Walks a result set page by page using the vendor's 1-based `start-index`
//! and `totalResults`, strictly one request at a time.

use async_trait::async_trait;
use tracing::debug;

use super::response::{RawReport, ReportPage};
use crate::error::Result;

/// Anything that can serve one page of a query at a given start index.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, start_index: u64) -> Result<ReportPage>;
}

/// Fetch every page from `first_index` onward and merge them.
///
/// After each page, rows remain while
/// `start_index + returned - 1 < totalResults`; the next request starts at
/// `start_index + returned`. A page with no rows ends the walk. Any failed
/// request aborts the whole fetch.
pub async fn fetch_all(source: &dyn PageSource, first_index: u64) -> Result<RawReport> {
    let mut start_index = first_index.max(1);

    let first = source.fetch_page(start_index).await?;
    let mut returned = first.rows.len() as u64;
    let total = first.total_results;
    let mut report = RawReport::from_first_page(first);
    debug!("Fetched page 1: {} rows from index {} of {}", returned, start_index, total);

    while returned > 0 && start_index + returned - 1 < total {
        start_index += returned;

        let page = source.fetch_page(start_index).await?;
        returned = page.rows.len() as u64;
        report.extend(page);
        debug!(
            "Fetched page {}: {} rows from index {} of {}",
            report.pages_fetched, returned, start_index, total
        );
    }

    Ok(report)
}
