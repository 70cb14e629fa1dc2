//! gatable
//!
//! Google Analytics (Core Reporting API v3) client: authenticate with a
//! keyfile, run a query across every result page, get a typed table back.
//!
//! ```no_run
//! use gatable::{connect, QueryPayload, ViewId};
//!
//! # async fn example() -> gatable::Result<()> {
//! let service = connect("client_secrets.json").await?;
//! let payload = QueryPayload::builder("30daysAgo", "yesterday")
//!     .metrics(["ga:sessions", "ga:pageviews", "ga:bounces"])
//!     .dimension("ga:date")
//!     .build()?;
//!
//! let table = service.run_query(&ViewId::parse("12345")?, &payload).await?;
//! println!("{}", table.to_text());
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod reports;
pub mod table;

pub use analytics::{AnalyticsService, OutputMode, QueryOutput, QueryPayload, RawReport, ViewId};
pub use auth::{connect, connect_with, CredentialProvider, StaticToken};
pub use config::Settings;
pub use error::{Error, Result};
pub use reports::ReportRequest;
pub use table::{Cell, Column, ColumnKind, ResultTable, Row};
