mod config;
mod model;
mod normalizer;
mod paginator;
mod parser;
mod pipeline;
mod retry;
mod scraper;
mod storage;
mod utils;

use clap::Parser;
use config::{AppConfig, Credentials, KrogerConfig, SourceConfig, load_config};
use model::{FetchError, RunSummary, WorkUnit};
use paginator::Paginator;
use pipeline::Pipeline;
use retry::RetryPolicy;
use scraper::{
    HttpFetcher, KrogerSource, ListingSource, OpenFoodFactsSource, Source, WalmartSource,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use storage::JsonSink;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Fetches paged product listings for every configured search term and
/// writes them to a single JSON file.
#[derive(Debug, Parser)]
#[command(name = "grocery-sniper", version)]
struct Cli {
    /// Output JSON file (replaced atomically)
    output: String,

    /// Path to the JSON config file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Panic occurred: {}", panic_info);
    }));

    let config = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config load error: {}", e);
            return ExitCode::from(1);
        }
    };

    let http = match HttpFetcher::new(&config.http) {
        Ok(h) => h,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };
    let retry = RetryPolicy::from_config(&config.retry);

    let (source, units) = match prepare_source(&config, http, &retry).await {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("Startup failed: {}", e);
            return ExitCode::from(1);
        }
    };
    if units.is_empty() {
        error!("No work units to run");
        return ExitCode::from(1);
    }

    let paginator = Paginator::new(
        retry,
        config.pagination.max_pages,
        Duration::from_millis(config.pagination.page_delay_ms),
    );
    let report = Pipeline::new(source, paginator, config.pagination.page_size)
        .with_concurrency(config.concurrency)
        .with_deadline(config.run_deadline_secs.map(Duration::from_secs))
        .run(units)
        .await;

    log_summary(&report.summary);

    // Write whatever succeeded, even on partial failure.
    let sink = JsonSink::new(&cli.output);
    if let Err(e) = sink.write(&report.result) {
        error!("Failed to write {}: {}", sink.path().display(), e);
        return ExitCode::from(1);
    }

    ExitCode::from(report.summary.exit_code())
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Builds the configured source and expands terms into work units.
async fn prepare_source(
    config: &AppConfig,
    http: HttpFetcher,
    retry: &RetryPolicy,
) -> Result<(Arc<dyn Source>, Vec<WorkUnit>), StartupError> {
    let terms = config.search_terms();

    match &config.source {
        SourceConfig::Kroger(cfg) => {
            let credentials = Credentials::resolve(cfg.client_id.as_deref())?;
            let source = KrogerSource::new(http, cfg, credentials);
            retry.execute(|| source.authenticate()).await?;

            let locations = resolve_locations(&source, cfg, retry).await?;
            info!("Using {} store location(s): {:?}", locations.len(), locations);

            let units: Vec<WorkUnit> = locations
                .iter()
                .flat_map(|loc| terms.iter().map(move |term| WorkUnit::scoped(loc, term)))
                .collect();
            let source: Arc<dyn Source> = Arc::new(source);
            Ok((source, units))
        }
        SourceConfig::OpenFoodFacts(cfg) => {
            let source: Arc<dyn Source> = Arc::new(OpenFoodFactsSource::new(http, cfg));
            Ok((source, scoped_units(&cfg.categories, &terms)))
        }
        SourceConfig::Walmart(cfg) => {
            let source: Arc<dyn Source> = Arc::new(WalmartSource::new(http, cfg));
            Ok((source, scoped_units(&cfg.categories, &terms)))
        }
        SourceConfig::Listing(cfg) => {
            let source = ListingSource::new(http, cfg)?;
            let units: Vec<WorkUnit> = terms.iter().map(|term| WorkUnit::for_term(term)).collect();
            let source: Arc<dyn Source> = Arc::new(source);
            Ok((source, units))
        }
    }
}

/// One unit per term, or per category and term when categories are set.
fn scoped_units(categories: &[String], terms: &[&str]) -> Vec<WorkUnit> {
    if categories.is_empty() {
        return terms.iter().map(|term| WorkUnit::for_term(term)).collect();
    }
    categories
        .iter()
        .flat_map(|cat| terms.iter().map(move |term| WorkUnit::scoped(cat, term)))
        .collect()
}

async fn resolve_locations(
    source: &KrogerSource,
    cfg: &KrogerConfig,
    retry: &RetryPolicy,
) -> Result<Vec<String>, FetchError> {
    if !cfg.location_ids.is_empty() {
        return Ok(cfg.location_ids.clone());
    }
    let Some(zip) = cfg.zip_code.as_deref() else {
        return Ok(Vec::new());
    };
    let found = retry
        .execute(|| source.find_locations(zip, cfg.radius_miles, cfg.location_limit))
        .await?;
    if found.is_empty() {
        warn!("No stores found near {}", zip);
    }
    Ok(found)
}

fn log_summary(summary: &RunSummary) {
    info!(
        "Run finished: {}/{} unit(s) succeeded, {} record(s) dropped during normalization",
        summary.succeeded.len(),
        summary.total_units(),
        summary.dropped_records()
    );
    for failure in &summary.failed {
        warn!("  failed: {} -> {}", failure.key, failure.error);
    }
}
