//! Chartcache - load dashboard charts from the command line.
//!
//! Each chart is fetched from the backend at most once per TTL; repeat runs
//! are answered from the on-disk cache under the user's cache directory.

mod cli;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chartcache_core::{
    AppConfig, CapacityCurveDataset, ChartClient, ChartError, ChartLoader, ChartSpec, Dataset,
    FileStore, TieredCache,
};
use clap::Parser;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Command};

type Loader = ChartLoader<ChartClient, FileStore>;

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file log on drop and must outlive `main`'s work.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}

fn build_loader(config: &AppConfig) -> Result<Loader> {
    let dir = config.cache_dir()?;
    let store = match config.cache.capacity_bytes {
        Some(capacity) => FileStore::with_capacity(dir, capacity)?,
        None => FileStore::new(dir)?,
    };
    let cache = Arc::new(TieredCache::new(store, config.cache.clone()));

    let mut client = ChartClient::new(&config.api_base_url)
        .context("Failed to create HTTP client")?;
    if let Some(ref token) = config.api_token {
        client = client.with_token(token.clone());
    }
    info!(
        api = client.base_url(),
        cache_dir = %cache.persistent().dir().display(),
        capacity_bytes = ?cache.persistent().capacity_bytes(),
        "Chart loader ready"
    );

    Ok(ChartLoader::new(cache, client))
}

/// Cancel in-flight loads on Ctrl-C.
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling chart loads");
            cancel.cancel();
        }
    });
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn load_one<D: Dataset>(
    loader: &Loader,
    dataset: &D,
    refresh: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    if refresh {
        loader.invalidate(dataset)?;
    }
    let chart = loader.load(dataset, cancel).await?;
    print_json(&serde_json::to_value(&chart)?)
}

/// A dashboard panel: the chart, or the message the panel shows instead.
fn panel(result: &Result<ChartSpec, ChartError>) -> Result<Value> {
    Ok(match result {
        Ok(chart) => serde_json::to_value(chart)?,
        Err(e) => json!({ "error": e.to_string() }),
    })
}

async fn dashboard(
    loader: &Loader,
    range: cli::DateRange,
    refresh: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let demand = range.demand()?;
    if refresh {
        loader.invalidate(&demand)?;
        loader.invalidate(&CapacityCurveDataset)?;
    }

    let (demand_chart, curve_chart) = futures::future::join(
        loader.load(&demand, cancel),
        loader.load(&CapacityCurveDataset, cancel),
    )
    .await;

    if cancel.is_cancelled() {
        anyhow::bail!("Cancelled");
    }

    print_json(&json!({
        demand.id(): panel(&demand_chart)?,
        CapacityCurveDataset.id(): panel(&curve_chart)?,
    }))?;

    if demand_chart.is_err() && curve_chart.is_err() {
        anyhow::bail!("No dashboard charts could be loaded");
    }
    Ok(())
}

fn show_config(config: &AppConfig, save: bool) -> Result<()> {
    if save {
        config.save().context("Failed to save config")?;
        eprintln!("Saved config to {}", AppConfig::config_path()?.display());
    }

    let mut shown = config.clone();
    if shown.api_token.is_some() {
        shown.api_token = Some("<redacted>".to_string());
    }
    print_json(&serde_json::to_value(&shown)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;
    info!("chartcache starting");

    let config = AppConfig::load()?;
    if let Command::Config { save } = cli.command {
        return show_config(&config, save);
    }

    let loader = build_loader(&config)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let result = match cli.command {
        Command::Demand { range } => load_one(&loader, &range.demand()?, cli.refresh, &cancel).await,
        Command::CapacityCurve => load_one(&loader, &CapacityCurveDataset, cli.refresh, &cancel).await,
        Command::Dashboard { range } => dashboard(&loader, range, cli.refresh, &cancel).await,
        Command::Clear => {
            let removed = loader.cache().purge();
            println!(
                "Removed {} cached chart(s) from {}",
                removed,
                loader.cache().persistent().dir().display()
            );
            Ok(())
        }
        Command::Config { .. } => Ok(()),
    };

    let stats = loader.cache().stats();
    let used_bytes = loader.cache().persistent().used_bytes().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to measure cache directory");
        0
    });
    info!(
        hits = stats.hits(),
        hit_rate = stats.hit_rate(),
        used_bytes,
        memory_hits = stats.memory_hits,
        persistent_hits = stats.persistent_hits,
        misses = stats.misses,
        expired = stats.expired,
        corrupt = stats.corrupt,
        evicted = stats.evicted,
        write_failures = stats.write_failures,
        "Cache statistics"
    );

    info!("chartcache shutting down");
    result
}
