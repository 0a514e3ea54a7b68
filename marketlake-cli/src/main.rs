//! marketlake CLI — batch equity-price pipeline commands.
//!
//! Commands:
//! - `ingest` — fetch daily prices and upload a partitioned raw dataset
//! - `trigger` — fire the orchestration trigger for a marker key or prefix
//! - `transform` — build the refined and monthly datasets from a raw run
//! - `run` — whole pipeline: ingest, trigger, transform, release the slot

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use marketlake_core::catalog::JsonCatalog;
use marketlake_core::fetch::{
    AlwaysReachable, ChartApiProvider, HttpPreflight, Preflight, PriceProvider, StdoutProgress,
    SyntheticProvider,
};
use marketlake_core::store::{LocalObjectStore, COMPLETION_MARKER};
use marketlake_pipeline::backend::{LocalJobBackend, RunState};
use marketlake_pipeline::ingest::{IngestOutcome, IngestRequest, IngestStats, IngestionEngine};
use marketlake_pipeline::transform::{TransformEngine, TransformRequest, TransformResult};
use marketlake_pipeline::trigger::{Decision, OrchestrationTrigger, TriggerSignal};
use marketlake_pipeline::PipelineConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "marketlake",
    about = "marketlake CLI — batch equity-price data pipeline"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch daily prices and upload a partitioned raw dataset.
    Ingest {
        /// Symbols to ingest. Defaults to the configured list.
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to lookback_days ago.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Use deterministic synthetic data instead of the network.
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Fire the orchestration trigger for a marker key or an explicit prefix.
    Trigger {
        /// Object key, typically a completion marker.
        #[arg(long)]
        key: Option<String>,

        /// Dataset prefix, alternative to --key.
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Build the refined and monthly datasets from an uploaded raw run.
    Transform {
        /// Raw run prefix inside the bucket, e.g.
        /// raw/ingestion_date=2024-01-05/run_ts=120000
        #[arg(long)]
        input_prefix: String,
    },
    /// Whole pipeline: ingest, trigger on the marker, transform, release.
    Run {
        /// Symbols to ingest. Defaults to the configured list.
        symbols: Vec<String>,

        /// Use deterministic synthetic data instead of the network.
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PipelineConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            symbols,
            start,
            end,
            synthetic,
        } => run_ingest(&config, symbols, start, end, synthetic).map(|_| ()),
        Commands::Trigger { key, prefix } => run_trigger(&config, key, prefix).map(|_| ()),
        Commands::Transform { input_prefix } => {
            run_transform(&config, &input_prefix).map(|_| ())
        }
        Commands::Run { symbols, synthetic } => run_pipeline(&config, symbols, synthetic),
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{value}', expected YYYY-MM-DD"))
}

/// Provider and preflight for the requested mode. Synthetic runs skip the
/// egress probe: there is no network to probe.
fn build_edges(
    config: &PipelineConfig,
    synthetic: bool,
) -> (Box<dyn PriceProvider>, Box<dyn Preflight>) {
    if synthetic {
        (
            Box::new(SyntheticProvider::new(42)),
            Box::new(AlwaysReachable),
        )
    } else {
        (
            Box::new(ChartApiProvider::new(config.endpoint.clone())),
            Box::new(HttpPreflight::new(config.endpoint.clone())),
        )
    }
}

fn run_ingest(
    config: &PipelineConfig,
    symbols: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    synthetic: bool,
) -> Result<Option<IngestStats>> {
    let symbols = if symbols.is_empty() {
        config.symbols.clone()
    } else {
        symbols
    };
    if symbols.is_empty() {
        bail!("no symbols: pass them as arguments or set `symbols` in the config");
    }

    let today = chrono::Local::now().date_naive();
    // Today's bar is still forming; the default window ends yesterday.
    let end_date = end
        .as_deref()
        .map(parse_date)
        .transpose()?
        .unwrap_or(today - chrono::Duration::days(1));
    let start_date = start
        .as_deref()
        .map(parse_date)
        .transpose()?
        .unwrap_or_else(|| end_date - chrono::Duration::days(config.lookback_days as i64));
    if start_date > end_date {
        bail!("start date {start_date} is after end date {end_date}");
    }

    let (provider, preflight) = build_edges(config, synthetic);
    let store = LocalObjectStore::new(&config.data_root);
    let engine = IngestionEngine::new(
        provider.as_ref(),
        preflight.as_ref(),
        &store,
        config.retry_config(),
        &config.staging_dir,
        config.bucket.clone(),
    );

    let request = IngestRequest {
        symbols,
        start: start_date,
        end: end_date,
        ingestion_date: today,
        run_ts: chrono::Local::now().format("%H%M%S").to_string(),
    };

    println!(
        "Ingesting {} symbol(s), {start_date} to {end_date}",
        request.symbols.len()
    );

    match engine.run(&request, &StdoutProgress)? {
        IngestOutcome::Completed(stats) => {
            print_ingest_summary(&stats);
            Ok(Some(stats))
        }
        IngestOutcome::SkippedNoEgress { reason } => {
            println!("Skipped: no network egress ({reason})");
            Ok(None)
        }
        IngestOutcome::SkippedEmpty => {
            println!("Skipped: no usable rows for the requested window");
            Ok(None)
        }
    }
}

fn print_ingest_summary(stats: &IngestStats) {
    println!();
    println!("=== Ingestion ===");
    println!("Rows:        {}", stats.rows_written);
    println!("Partitions:  {}", stats.partitions_written);
    println!("Symbols:     {}", stats.symbols_covered.join(" "));
    if !stats.missing_symbols.is_empty() {
        println!("Missing:     {}", stats.missing_symbols.join(" "));
    }
    println!("Attempts:    {} batched", stats.batched_attempts);
    println!("Location:    {}", stats.output_location);
}

fn run_trigger(
    config: &PipelineConfig,
    key: Option<String>,
    prefix: Option<String>,
) -> Result<Option<String>> {
    let signal = match key {
        Some(key) => TriggerSignal::Notification {
            bucket: config.bucket.clone(),
            key,
        },
        None => TriggerSignal::Manual {
            bucket: config.bucket.clone(),
            key: None,
            prefix,
        },
    };

    let backend = LocalJobBackend::new(&config.run_ledger);
    let trigger = OrchestrationTrigger::new(&backend, &config.job_name);
    let decision = trigger.on_signal(&signal)?;

    println!("[{}] {}", decision.status_code(), decision.message());

    match decision {
        Decision::Started { run_id } => Ok(Some(run_id)),
        Decision::RejectedBadSignal { reason } => bail!("trigger rejected the signal: {reason}"),
        _ => Ok(None),
    }
}

fn run_transform(config: &PipelineConfig, input_prefix: &str) -> Result<TransformResult> {
    let store = LocalObjectStore::new(&config.data_root);
    let bucket_path = store.bucket_path(&config.bucket);

    let catalog = JsonCatalog::new(&config.catalog_dir);
    let engine = TransformEngine::new(&catalog);
    let request = TransformRequest {
        input_root: bucket_path.join(input_prefix.trim_end_matches('/')),
        refined_root: bucket_path.join("refined"),
        aggregate_root: bucket_path.join("agg"),
    };

    let result = engine.run(&request)?;
    print_transform_summary(&result);
    Ok(result)
}

fn print_transform_summary(result: &TransformResult) {
    println!();
    println!("=== Transform ===");
    println!("Refined rows:    {}", result.refined_rows);
    println!("Aggregate rows:  {}", result.aggregate_rows);
    println!("Symbols:         {}", result.symbols_processed);
    println!("Features:        {}", result.feature_count);
    println!("New partitions:  {}", result.partitions_registered);
    if let Some(warning) = &result.catalog_warning {
        println!("WARNING: catalog registration failed: {warning}");
    }
}

/// Full pipeline run. A skipped ingestion ends the run successfully; a
/// trigger skip means another run owns the transform and this one stops.
fn run_pipeline(config: &PipelineConfig, symbols: Vec<String>, synthetic: bool) -> Result<()> {
    let Some(stats) = run_ingest(config, symbols, None, None, synthetic)? else {
        return Ok(());
    };

    // output_location is "bucket/prefix"; the trigger wants the marker key
    let prefix = stats
        .output_location
        .strip_prefix(&format!("{}/", config.bucket))
        .unwrap_or(&stats.output_location)
        .to_string();
    let marker_key = format!("{prefix}/{COMPLETION_MARKER}");

    let Some(run_id) = run_trigger(config, Some(marker_key), None)? else {
        return Ok(());
    };

    let backend = LocalJobBackend::new(&config.run_ledger);
    match run_transform(config, &prefix) {
        Ok(_) => {
            backend.mark_finished(&run_id, RunState::Succeeded)?;
            Ok(())
        }
        Err(e) => {
            backend.mark_finished(&run_id, RunState::Failed)?;
            Err(e)
        }
    }
}
