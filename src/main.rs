//! # Dram
//!
//! Polls a catalog of RSS/Atom feeds and HTML listing pages, keeps only the
//! items not seen in the last 30 days, and has an LLM sort them into
//! `act_now`, `watch` and `ignore`. Urgent items get a short written analysis;
//! everything worth reading ends up in an HTML report.
//!
//! ## Usage
//!
//! ```sh
//! dram --sources config/sources.yaml --data-dir ~/.dram
//! ```
//!
//! ## Pipeline
//!
//! 1. **Fetch**: every source concurrently; a broken source yields nothing
//! 2. **Dedup**: drop URLs already in `<data_dir>/seen.json`
//! 3. **Mark seen**: persist the new URLs before any model call
//! 4. **Triage**: score new items in batches of ten
//! 5. **Analyze**: one deeper call per `act_now` item
//! 6. **Report**: HTML and JSON under `<data_dir>/reports/`

use awful_aj::config::AwfulJadeConfig;
use awful_aj::template::ChatTemplate;
use awful_aj::{config, config_dir, template};
use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod dedup;
mod ingest;
mod markup;
mod models;
mod outputs;
mod sanitize;
mod scrapers;
mod sources;
mod triage;
mod utils;

use cli::Cli;
use dedup::{RunLock, SeenStore};
use ingest::Fetcher;
use models::{RunReport, Score};
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "dram run starting");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let result = run(&args).await;
    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(?elapsed, secs = elapsed.as_secs(), "Run complete"),
        Err(e) => error!(?elapsed, error = %e, "Run failed"),
    }
    result
}

async fn run(args: &Cli) -> Result<(), Box<dyn Error>> {
    let sources = sources::load_sources(&args.sources).await?;
    let data_dir = args.data_dir();

    // ---- Fetch ----
    let fetcher = Fetcher::new(args.timeout())?;
    let items = ingest::fetch_all(&fetcher, &sources, args.concurrency).await;
    if items.is_empty() {
        info!("No items fetched; ending run");
        return Ok(());
    }

    let store = SeenStore::in_dir(&data_dir);

    if args.dry_run {
        let fresh = store.dedup(items, Utc::now()).await;
        for item in &fresh {
            info!(source = %item.source_id, url = %item.url, title = %item.title, "New item");
        }
        info!(count = fresh.len(), "Dry run; stopping before mark-seen and triage");
        return Ok(());
    }

    // ---- Dedup under the run lock ----
    ensure_writable_dir(&data_dir).await?;
    let _lock = RunLock::acquire(&store, Utc::now()).await?;
    let fresh = store.dedup(items, Utc::now()).await;
    info!(count = fresh.len(), "New items after dedup");
    if fresh.is_empty() {
        info!("No new items; ending run");
        return Ok(());
    }

    // Loaded before mark-seen so a broken model setup does not swallow items.
    let model = load_model(args).await?;
    store.mark_seen(&fresh, Utc::now()).await?;

    // ---- Triage and analysis ----
    let triage_api = api::client(&model.config, &model.triage);
    let scored = triage::score_items(&triage_api, fresh).await;
    let (urgent, rest): (Vec<_>, Vec<_>) = scored.into_iter().partition(|s| s.score == Score::ActNow);

    let analysis_api = api::client(&model.config, &model.analysis);
    let analyzed = triage::analyze_all(&analysis_api, urgent).await;

    // ---- Reports ----
    let report = RunReport::new(Utc::now(), sources.len(), analyzed, rest);
    info!(
        act_now = report.act_now.len(),
        watch = report.watch.len(),
        ignore = report.ignore.len(),
        "Run summary"
    );
    if report.is_empty() {
        info!("Nothing to act on or watch; no report this run");
    } else {
        for path in outputs::write_reports(&report, &data_dir).await {
            info!(path = %path.display(), "Report ready");
        }
    }
    Ok(())
}

struct Model {
    config: AwfulJadeConfig,
    triage: ChatTemplate,
    analysis: ChatTemplate,
}

#[instrument(level = "info", skip_all)]
async fn load_model(args: &Cli) -> Result<Model, Box<dyn Error>> {
    let conf_file = match &args.config {
        Some(path) => path.clone(),
        None => config_dir()?.join("config.yaml"),
    };
    let config_path = conf_file.to_str().ok_or("model config path is not valid UTF-8")?;
    let config = config::load_config(config_path)
        .map_err(|e| format!("cannot load model config {config_path}: {e}"))?;
    info!(config_path, "Loaded configuration");

    let triage = template::load_template(&args.triage_template).await?;
    let analysis = template::load_template(&args.analysis_template).await?;
    info!(
        triage = %args.triage_template,
        analysis = %args.analysis_template,
        "Loaded templates"
    );
    Ok(Model {
        config,
        triage,
        analysis,
    })
}
