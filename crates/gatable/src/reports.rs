//! Monthly Reports
//!
//! Ready-made month-by-month views built on the query runner: ecommerce
//! overview, coupon performance and Google Ads performance. Each report keys
//! its rows by a `Period` column rendered as `"January, 2020"`, newest first.
//! With `formatted` set, numbers come back as display strings (`1,234`,
//! `12.34%`, `£1,234.56`).

use chrono::NaiveDate;
use tracing::info;

use crate::analytics::{AnalyticsService, QueryPayload, ViewId};
use crate::config::DEFAULT_CURRENCY_SYMBOL;
use crate::error::Result;
use crate::table::{Cell, ColumnKind, ResultTable};

const PERIOD: &str = "Period";
const COUPON_FILTER: &str = "ga:orderCouponCode!=(not set)";
const NON_COUPON_FILTER: &str = "ga:orderCouponCode==(not set)";
const GOOGLE_ADS_FILTER: &str = "ga:medium==cpc;ga:source==google";

const ORDER_METRICS: [&str; 3] = ["ga:transactions", "ga:transactionRevenue", "ga:revenuePerTransaction"];

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub view: ViewId,
    pub start_date: String,
    pub end_date: String,
    pub segment: Option<String>,
    /// ANDed with any filter the report applies itself
    pub filters: Option<String>,
    pub formatted: bool,
    pub currency_symbol: String,
}

impl ReportRequest {
    pub fn new(view: ViewId, start_date: impl Into<String>, end_date: impl Into<String>) -> Self {
        Self {
            view,
            start_date: start_date.into(),
            end_date: end_date.into(),
            segment: None,
            filters: None,
            formatted: true,
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
        }
    }

    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = Some(segment.into());
        self
    }

    pub fn filters(mut self, filters: impl Into<String>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn formatted(mut self, formatted: bool) -> Self {
        self.formatted = formatted;
        self
    }

    pub fn currency_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.currency_symbol = symbol.into();
        self
    }

    fn payload(&self, metrics: &[&str], report_filter: Option<&str>) -> Result<QueryPayload> {
        let mut builder = QueryPayload::builder(&self.start_date, &self.end_date)
            .metrics(metrics.iter().copied())
            .dimension("ga:yearMonth")
            .sort("-ga:yearMonth");

        if let Some(segment) = &self.segment {
            builder = builder.segment(segment);
        }

        let filters: Vec<&str> = report_filter
            .into_iter()
            .chain(self.filters.as_deref())
            .filter(|f| !f.trim().is_empty())
            .collect();
        if !filters.is_empty() {
            builder = builder.filters(filters.join(";"));
        }

        builder.build()
    }
}

// ── Reports ─────────────────────────────────────────────────────────────────

/// Entrances, sessions, pageviews, transactions, conversion rate, revenue and
/// AOV per month.
pub async fn monthly_ecommerce_overview(service: &AnalyticsService, request: &ReportRequest) -> Result<ResultTable> {
    info!("Building monthly ecommerce overview for {}", request.view);

    let payload = request.payload(
        &[
            "ga:entrances",
            "ga:sessions",
            "ga:pageviews",
            "ga:transactions",
            "ga:transactionsPerSession",
            "ga:transactionRevenue",
            "ga:revenuePerTransaction",
        ],
        None,
    )?;
    let table = service.run_query(&request.view, &payload).await?;
    shape_ecommerce(table, request)
}

/// Coupon against non-coupon orders per month, with the share of
/// transactions and revenue that used a coupon.
pub async fn monthly_coupons_overview(service: &AnalyticsService, request: &ReportRequest) -> Result<ResultTable> {
    info!("Building monthly coupons overview for {}", request.view);

    let all_orders = service
        .run_query(&request.view, &request.payload(&ORDER_METRICS, None)?)
        .await?;
    let coupon = service
        .run_query(&request.view, &request.payload(&ORDER_METRICS, Some(COUPON_FILTER))?)
        .await?;
    let non_coupon = service
        .run_query(&request.view, &request.payload(&ORDER_METRICS, Some(NON_COUPON_FILTER))?)
        .await?;

    shape_coupons(all_orders, coupon, non_coupon, request)
}

/// Google Ads (cpc / google) traffic per month with costs, CPC and cost of
/// sale.
pub async fn monthly_google_ads_overview(service: &AnalyticsService, request: &ReportRequest) -> Result<ResultTable> {
    info!("Building monthly Google Ads overview for {}", request.view);

    let payload = request.payload(
        &[
            "ga:entrances",
            "ga:sessions",
            "ga:transactions",
            "ga:transactionsPerSession",
            "ga:transactionRevenue",
            "ga:revenuePerTransaction",
            "ga:adCost",
            "ga:CPC",
        ],
        Some(GOOGLE_ADS_FILTER),
    )?;
    let table = service.run_query(&request.view, &payload).await?;
    shape_google_ads(table, request)
}

// ── Shaping ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Style {
    Count,
    Percent,
    Money(usize),
}

fn shape_ecommerce(mut table: ResultTable, request: &ReportRequest) -> Result<ResultTable> {
    with_period(&mut table)?;
    table.rename_columns(&[
        ("entrances", "Entrances"),
        ("sessions", "Sessions"),
        ("pageviews", "Pageviews"),
        ("transactions", "Transactions"),
        ("transactionsPerSession", "Conversion rate"),
        ("revenuePerTransaction", "AOV"),
        ("transactionRevenue", "Revenue"),
    ]);

    if request.formatted {
        apply_styles(
            &mut table,
            &[
                ("Entrances", Style::Count),
                ("Sessions", Style::Count),
                ("Pageviews", Style::Count),
                ("Transactions", Style::Count),
                ("Conversion rate", Style::Percent),
                ("AOV", Style::Money(2)),
                ("Revenue", Style::Money(0)),
            ],
            &request.currency_symbol,
        )?;
    }
    Ok(table)
}

fn shape_coupons(
    mut all_orders: ResultTable,
    mut coupon: ResultTable,
    mut non_coupon: ResultTable,
    request: &ReportRequest,
) -> Result<ResultTable> {
    with_period(&mut all_orders)?;
    all_orders.rename_columns(&[
        ("transactions", "Transactions"),
        ("revenuePerTransaction", "AOV"),
        ("transactionRevenue", "Revenue"),
    ]);

    with_period(&mut coupon)?;
    coupon.rename_columns(&[
        ("transactions", "Coupon transactions"),
        ("revenuePerTransaction", "Coupon AOV"),
        ("transactionRevenue", "Coupon revenue"),
    ]);

    with_period(&mut non_coupon)?;
    non_coupon.rename_columns(&[
        ("transactions", "Non-coupon transactions"),
        ("revenuePerTransaction", "Non-coupon AOV"),
        ("transactionRevenue", "Non-coupon revenue"),
    ]);

    let mut merged = coupon
        .left_join(&non_coupon, PERIOD)?
        .left_join(&all_orders, PERIOD)?;

    merged.add_column("Coupon AOV uplift", ColumnKind::Float, |row| {
        match (number(row.get("Coupon AOV")), number(row.get("AOV"))) {
            (Some(coupon_aov), Some(aov)) => Cell::Float(round_to(coupon_aov - aov, 2)),
            _ => Cell::Null,
        }
    });
    merged.add_column("Transactions via coupons", ColumnKind::Float, |row| {
        share(number(row.get("Coupon transactions")), number(row.get("Transactions")), 2)
    });
    merged.add_column("Revenue via coupons", ColumnKind::Float, |row| {
        share(number(row.get("Coupon revenue")), number(row.get("Revenue")), 0)
    });

    let mut table = merged.select(&[
        PERIOD,
        "Coupon transactions",
        "Transactions via coupons",
        "Coupon revenue",
        "Revenue via coupons",
        "Coupon AOV",
        "Non-coupon AOV",
        "Coupon AOV uplift",
    ])?;

    if request.formatted {
        apply_styles(
            &mut table,
            &[
                ("Coupon transactions", Style::Count),
                ("Transactions via coupons", Style::Percent),
                ("Coupon revenue", Style::Money(0)),
                ("Revenue via coupons", Style::Percent),
                ("Coupon AOV", Style::Money(2)),
                ("Non-coupon AOV", Style::Money(2)),
                ("Coupon AOV uplift", Style::Money(2)),
            ],
            &request.currency_symbol,
        )?;
    }
    Ok(table)
}

fn shape_google_ads(mut table: ResultTable, request: &ReportRequest) -> Result<ResultTable> {
    with_period(&mut table)?;
    table.rename_columns(&[
        ("entrances", "Entrances"),
        ("sessions", "Sessions"),
        ("transactions", "Transactions"),
        ("transactionsPerSession", "Conversion rate"),
        ("revenuePerTransaction", "AOV"),
        ("transactionRevenue", "Revenue"),
        ("adCost", "Costs"),
    ]);

    table.add_column("COS", ColumnKind::Float, |row| {
        match (number(row.get("Costs")), number(row.get("Revenue"))) {
            (Some(costs), Some(revenue)) if revenue != 0.0 => Cell::Float(costs / revenue * 100.0),
            _ => Cell::Null,
        }
    });

    if request.formatted {
        apply_styles(
            &mut table,
            &[
                ("Entrances", Style::Count),
                ("Sessions", Style::Count),
                ("Transactions", Style::Count),
                ("Conversion rate", Style::Percent),
                ("AOV", Style::Money(2)),
                ("Revenue", Style::Money(0)),
                ("Costs", Style::Money(0)),
                ("CPC", Style::Money(2)),
                ("COS", Style::Percent),
            ],
            &request.currency_symbol,
        )?;
    }
    Ok(table)
}

/// Render `yearMonth` (`202001`) as `January, 2020` and rename it `Period`.
fn with_period(table: &mut ResultTable) -> Result<()> {
    table.map_column("yearMonth", ColumnKind::String, |cell| match cell {
        Cell::Str(raw) => Cell::Str(format_period(raw).unwrap_or_else(|| raw.clone())),
        other => other.clone(),
    })?;
    table.rename_columns(&[("yearMonth", PERIOD)]);
    Ok(())
}

fn format_period(year_month: &str) -> Option<String> {
    NaiveDate::parse_from_str(&format!("{}01", year_month.trim()), "%Y%m%d")
        .ok()
        .map(|date| date.format("%B, %Y").to_string())
}

fn apply_styles(table: &mut ResultTable, styles: &[(&str, Style)], currency: &str) -> Result<()> {
    for (column, style) in styles {
        if table.column_index(column).is_none() {
            continue;
        }
        table.map_column(column, ColumnKind::String, |cell| match cell.as_f64() {
            Some(value) => Cell::Str(render(value, *style, currency)),
            None => cell.clone(),
        })?;
    }
    Ok(())
}

fn render(value: f64, style: Style, currency: &str) -> String {
    match style {
        Style::Count => format_number(value, 0),
        Style::Percent => format!("{}%", format_number(value, 2)),
        Style::Money(decimals) => format!("{}{}", currency, format_number(value, decimals)),
    }
}

// ── Numeric helpers ─────────────────────────────────────────────────────────

fn number(cell: Option<&Cell>) -> Option<f64> {
    cell.and_then(Cell::as_f64)
}

/// `part / whole * 100`, rounded; `Null` when either side is missing or the
/// whole is zero.
fn share(part: Option<f64>, whole: Option<f64>, decimals: i32) -> Cell {
    match (part, whole) {
        (Some(part), Some(whole)) if whole != 0.0 => Cell::Float(round_to(part / whole * 100.0, decimals)),
        _ => Cell::Null,
    }
}

/// Half-to-even rounding at `decimals` places.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

/// Fixed decimals with comma thousands separators, e.g. `1,234,567.89`.
pub fn format_number(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let negative = value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}
