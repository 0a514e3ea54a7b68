//! Ingestion engine: fetch → normalize → partitioned write → upload → mark.
//!
//! A linear state machine with no branching retries of its own — retry
//! policy lives inside the fetch ladder, upload atomicity inside the sync
//! protocol. The two skip outcomes (no egress, empty result) are values,
//! not errors, so schedulers don't treat them as crashes; everything else
//! propagates.

use chrono::NaiveDate;
use marketlake_core::domain::RawBatch;
use marketlake_core::fetch::{
    FetchError, FetchProgress, Preflight, PriceProvider, RetryConfig, RetryFetcher,
};
use marketlake_core::store::parquet::batch_to_frame;
use marketlake_core::store::{
    ObjectStore, ObjectStoreSync, PartitionedWriter, StoreError, WriteOutcome,
};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// One ingestion invocation.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Calendar day the job ran; scopes the output partition.
    pub ingestion_date: NaiveDate,
    /// `HHMMSS` token disambiguating multiple runs on the same day.
    pub run_ts: String,
}

/// Stats for a completed run.
#[derive(Debug, Clone)]
pub struct IngestStats {
    pub rows_written: usize,
    pub partitions_written: usize,
    pub symbols_covered: Vec<String>,
    pub missing_symbols: Vec<String>,
    /// `bucket/prefix` of the run's output, marker at its root.
    pub output_location: String,
    pub batched_attempts: u32,
}

/// Terminal outcome of a run. The skips are non-zero-but-non-fatal:
/// callers report them, they never raise.
#[derive(Debug)]
pub enum IngestOutcome {
    Completed(IngestStats),
    SkippedNoEgress { reason: String },
    SkippedEmpty,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("storage failed: {0}")]
    Store(#[from] StoreError),
}

pub struct IngestionEngine<'a> {
    provider: &'a dyn PriceProvider,
    preflight: &'a dyn Preflight,
    store: &'a dyn ObjectStore,
    retry: RetryConfig,
    staging_dir: PathBuf,
    bucket: String,
}

impl<'a> IngestionEngine<'a> {
    pub fn new(
        provider: &'a dyn PriceProvider,
        preflight: &'a dyn Preflight,
        store: &'a dyn ObjectStore,
        retry: RetryConfig,
        staging_dir: impl Into<PathBuf>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            preflight,
            store,
            retry,
            staging_dir: staging_dir.into(),
            bucket: bucket.into(),
        }
    }

    /// Remote prefix for a run: `raw/ingestion_date=<date>/run_ts=<ts>`.
    pub fn run_prefix(ingestion_date: NaiveDate, run_ts: &str) -> String {
        format!(
            "raw/ingestion_date={}/run_ts={run_ts}",
            ingestion_date.format("%Y-%m-%d")
        )
    }

    pub fn run(
        &self,
        req: &IngestRequest,
        progress: &dyn FetchProgress,
    ) -> Result<IngestOutcome, IngestError> {
        // PREFLIGHT + FETCH. The fetcher runs the preflight first and a
        // dead network surfaces as the distinguished no-egress skip.
        let fetcher = RetryFetcher::new(self.provider, self.preflight, self.retry.clone());
        let report = match fetcher.fetch(&req.symbols, req.start, req.end, progress) {
            Ok(report) => report,
            Err(FetchError::NoEgress(reason)) => {
                return Ok(IngestOutcome::SkippedNoEgress { reason });
            }
            Err(e) => return Err(e.into()),
        };

        if report.is_empty() {
            return Ok(IngestOutcome::SkippedEmpty);
        }

        // NORMALIZE: tag the batch, enforce (symbol, trade_date) uniqueness,
        // frame it in the canonical tall schema.
        let mut batch = RawBatch::new(report.rows, req.ingestion_date, req.run_ts.clone());
        batch.dedup_keep_last();
        let frame = batch_to_frame(&batch.rows)?;

        // PARTITION_WRITE into a run-scoped staging tree.
        let prefix = Self::run_prefix(req.ingestion_date, &req.run_ts);
        let run_dir = self.staging_dir.join(&prefix);
        if run_dir.exists() {
            // Leftover from a crashed run with the same token; the rerun
            // fully supersedes it.
            fs::remove_dir_all(&run_dir).map_err(|e| {
                IngestError::Store(StoreError::Io {
                    path: run_dir.display().to_string(),
                    reason: e.to_string(),
                })
            })?;
        }

        let writer = PartitionedWriter::new(&run_dir);
        let (rows_written, partitions_written) = match writer.write(&frame, &["trade_date"])? {
            WriteOutcome::Written {
                partitions_written,
                rows,
            } => (rows, partitions_written),
            WriteOutcome::Empty => return Ok(IngestOutcome::SkippedEmpty),
        };

        // UPLOAD, then MARK_COMPLETE only after every object landed.
        let sync = ObjectStoreSync::new(self.store);
        let sync_report = sync.sync(&run_dir, &self.bucket, &prefix)?;
        sync.publish_marker(&self.bucket, &prefix, &sync_report)?;

        Ok(IngestOutcome::Completed(IngestStats {
            rows_written,
            partitions_written,
            symbols_covered: report.symbols_covered,
            missing_symbols: report.missing_symbols,
            output_location: format!("{}/{prefix}", self.bucket),
            batched_attempts: report.batched_attempts,
        }))
    }
}
