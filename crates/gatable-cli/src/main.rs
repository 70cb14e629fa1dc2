use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gatable::analytics::SamplingLevel;
use gatable::auth::{forget_cached_token, CredentialProvider, Keyfile, TokenCache};
use gatable::reports::{monthly_coupons_overview, monthly_ecommerce_overview, monthly_google_ads_overview};
use gatable::{connect_with, AnalyticsService, OutputMode, QueryOutput, QueryPayload, ReportRequest, ResultTable, Settings, StaticToken, ViewId};

const ACCESS_TOKEN_ENV: &str = "GATABLE_ACCESS_TOKEN";

#[derive(Parser, Debug)]
#[command(name = "gatable", version, about = "Query Google Analytics into tables")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file (default ~/.gatable/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Credential keyfile (client secrets or service account JSON)
    #[arg(long, global = true)]
    keyfile: Option<PathBuf>,

    /// Use a pre-issued access token instead of a keyfile
    #[arg(long, global = true, env = ACCESS_TOKEN_ENV, hide_env_values = true)]
    access_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authenticate and cache the token
    Auth(AuthArgs),
    /// Run a query across all result pages
    Query(QueryArgs),
    /// Build a monthly report
    Report(ReportArgs),
}

#[derive(Args, Debug)]
struct AuthArgs {
    /// Delete the cached token instead of authenticating
    #[arg(long)]
    forget: bool,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// View (profile) id, with or without the `ga:` prefix
    #[arg(long)]
    view: Option<String>,
    #[arg(long)]
    start: String,
    #[arg(long)]
    end: String,
    /// Comma-separated metrics, e.g. ga:sessions,ga:pageviews
    #[arg(long)]
    metrics: String,
    /// Comma-separated dimensions, e.g. ga:date
    #[arg(long)]
    dimensions: String,
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    filters: Option<String>,
    #[arg(long)]
    segment: Option<String>,
    #[arg(long, value_enum)]
    sampling_level: Option<Sampling>,
    /// Rows per page (1-10000)
    #[arg(long)]
    max_results: Option<u32>,
    #[arg(long)]
    start_index: Option<u32>,
    /// Print the merged vendor response instead of the table
    #[arg(long)]
    raw: bool,
    #[arg(long, value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(Args, Debug)]
struct ReportArgs {
    #[arg(value_enum)]
    kind: ReportKind,
    #[arg(long)]
    view: Option<String>,
    #[arg(long)]
    start: String,
    #[arg(long)]
    end: String,
    #[arg(long)]
    segment: Option<String>,
    #[arg(long)]
    filters: Option<String>,
    /// Keep numbers numeric instead of display strings
    #[arg(long)]
    raw_numbers: bool,
    #[arg(long, value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Table,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ReportKind {
    Ecommerce,
    Coupons,
    GoogleAds,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Sampling {
    Default,
    Faster,
    HigherPrecision,
}

impl From<Sampling> for SamplingLevel {
    fn from(level: Sampling) -> Self {
        match level {
            Sampling::Default => SamplingLevel::Default,
            Sampling::Faster => SamplingLevel::Faster,
            Sampling::HigherPrecision => SamplingLevel::HigherPrecision,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("failed to load settings")?;
    debug!("Settings: {:?}", settings);

    match &cli.command {
        Command::Auth(args) => run_auth(&cli, &settings, args).await,
        Command::Query(args) => run_query(&cli, &settings, args).await,
        Command::Report(args) => run_report(&cli, &settings, args).await,
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();
}

fn keyfile_path(cli: &Cli, settings: &Settings) -> Result<PathBuf> {
    cli.keyfile
        .clone()
        .or_else(|| settings.keyfile.clone())
        .context("no keyfile given; pass --keyfile, set \"keyfile\" in the settings file or set GATABLE_ACCESS_TOKEN")
}

async fn service(cli: &Cli, settings: &Settings) -> Result<AnalyticsService> {
    if let Some(token) = &cli.access_token {
        let credentials: Arc<dyn CredentialProvider> = Arc::new(StaticToken::new(token.as_str()));
        return AnalyticsService::with_settings(credentials, settings).context("failed to build HTTP client");
    }

    let keyfile = keyfile_path(cli, settings)?;
    connect_with(&keyfile, settings)
        .await
        .with_context(|| format!("failed to authenticate with {}", keyfile.display()))
}

fn view(arg: &Option<String>, settings: &Settings) -> Result<ViewId> {
    let raw = arg
        .as_deref()
        .or(settings.view.as_deref())
        .context("no view given; pass --view or set \"view\" in the settings file")?;
    ViewId::parse(raw).context("invalid view id")
}

async fn run_auth(cli: &Cli, settings: &Settings, args: &AuthArgs) -> Result<()> {
    if args.forget {
        let keyfile = keyfile_path(cli, settings)?;
        match forget_cached_token(&keyfile, settings).context("failed to clear token cache")? {
            Some(path) => println!("Removed cached token {}", path.display()),
            None => println!("Service account credentials are not cached"),
        }
        return Ok(());
    }

    let service = service(cli, settings).await?;
    println!("Authenticated with {} credentials", service.credentials().name());

    if cli.access_token.is_none() {
        let keyfile = keyfile_path(cli, settings)?;
        if let Keyfile::Installed(_) = Keyfile::load(&keyfile)? {
            let cache = TokenCache::new(settings.token_cache_dir()?);
            println!("Token cache: {}", cache.dir().display());
        }
    }
    Ok(())
}

async fn run_query(cli: &Cli, settings: &Settings, args: &QueryArgs) -> Result<()> {
    let view = view(&args.view, settings)?;

    let mut builder = QueryPayload::builder(&args.start, &args.end)
        .metric(&args.metrics)
        .dimension(&args.dimensions);
    if let Some(sort) = &args.sort {
        builder = builder.sort(sort);
    }
    if let Some(filters) = &args.filters {
        builder = builder.filters(filters);
    }
    if let Some(segment) = &args.segment {
        builder = builder.segment(segment);
    }
    if let Some(level) = args.sampling_level {
        builder = builder.sampling_level(level.into());
    }
    if let Some(max_results) = args.max_results {
        builder = builder.max_results(max_results);
    }
    if let Some(start_index) = args.start_index {
        builder = builder.start_index(start_index);
    }
    let payload = builder.build().context("invalid query")?;

    let mode = if args.raw { OutputMode::Raw } else { OutputMode::Table };
    let service = service(cli, settings).await?;
    let output = service.run_query_as(&view, &payload, mode).await.context("query failed")?;

    match (output, args.format) {
        (QueryOutput::Table(table), Format::Table) => print_table(&table),
        (output, _) => println!("{}", serde_json::to_string_pretty(&output)?),
    }
    Ok(())
}

async fn run_report(cli: &Cli, settings: &Settings, args: &ReportArgs) -> Result<()> {
    let mut request = ReportRequest::new(view(&args.view, settings)?, &args.start, &args.end)
        .formatted(!args.raw_numbers)
        .currency_symbol(settings.currency_symbol());
    if let Some(segment) = &args.segment {
        request = request.segment(segment);
    }
    if let Some(filters) = &args.filters {
        request = request.filters(filters);
    }

    let service = service(cli, settings).await?;
    let table = match args.kind {
        ReportKind::Ecommerce => monthly_ecommerce_overview(&service, &request).await,
        ReportKind::Coupons => monthly_coupons_overview(&service, &request).await,
        ReportKind::GoogleAds => monthly_google_ads_overview(&service, &request).await,
    }
    .context("report failed")?;

    match args.format {
        Format::Table => print_table(&table),
        Format::Json => println!("{}", serde_json::to_string_pretty(&table)?),
    }
    Ok(())
}

fn print_table(table: &ResultTable) {
    if table.is_empty() {
        eprintln!("No rows");
    }
    println!("{}", table.to_text());
}
