//! Transform engine: refined feature table, monthly rollup, catalog
//! registration.
//!
//! Input is the canonical tall layout the ingestion stage writes. Wide
//! per-symbol column layouts are not accepted here — normalization is the
//! provider parser's job — but they are detected and named in the error so
//! a miswired input fails loudly instead of producing garbage features.
//!
//! Catalog registration is deliberately non-fatal: by the time it runs,
//! the refined and aggregate datasets are already durable, and a metadata
//! outage should not fail the run that produced good data.

use crate::features::{feature_exprs, month_key, monthly_aggs, BASE_COLUMNS, FEATURE_COLUMNS};
use marketlake_core::catalog::{Catalog, CatalogError, PartitionAdd, TableSpec};
use marketlake_core::store::parquet::{read_parquet_tree, write_parquet};
use marketlake_core::store::{PartitionedWriter, StoreError, WriteOutcome};
use polars::prelude::*;
use std::path::PathBuf;
use thiserror::Error;

pub const REFINED_TABLE: &str = "refined_prices";
pub const AGGREGATE_TABLE: &str = "monthly_price_summary";

const PRICE_FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// One transform invocation: where to read the raw tree, where to put the
/// two outputs.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub input_root: PathBuf,
    pub refined_root: PathBuf,
    pub aggregate_root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub refined_rows: usize,
    pub aggregate_rows: usize,
    pub symbols_processed: usize,
    pub feature_count: usize,
    /// Newly created catalog partitions; re-runs over the same dates
    /// register zero.
    pub partitions_registered: usize,
    /// Set when registration failed after the data was already written.
    pub catalog_warning: Option<String>,
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("storage failed: {0}")]
    Store(#[from] StoreError),

    #[error("input schema rejected: {0}")]
    Schema(String),

    #[error("dataframe operation failed: {0}")]
    Frame(#[from] PolarsError),

    #[error("catalog rejected registration: {0}")]
    Catalog(#[from] CatalogError),
}

pub struct TransformEngine<'a> {
    catalog: &'a dyn Catalog,
}

impl<'a> TransformEngine<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self { catalog }
    }

    pub fn run(&self, req: &TransformRequest) -> Result<TransformResult, TransformError> {
        let raw = read_parquet_tree(&req.input_root)?;
        reject_wide_layout(&raw)?;
        require_base_columns(&raw)?;

        let refined = engineer_features(&raw)?;
        let symbols_processed = refined
            .column("symbol")?
            .as_materialized_series()
            .n_unique()?;

        let refined_rows = match PartitionedWriter::new(&req.refined_root)
            .write(&refined, &["trade_date", "symbol"])?
        {
            WriteOutcome::Written { rows, .. } => rows,
            WriteOutcome::Empty => 0,
        };

        let aggregate = monthly_rollup(&refined)?;
        write_parquet(&aggregate, &req.aggregate_root.join("data.parquet"))?;

        // Both datasets are durable from here on; registration failures
        // downgrade to a warning on the result.
        let (partitions_registered, catalog_warning) =
            match self.register(req, &refined, &aggregate) {
                Ok(created) => (created, None),
                Err(e) => (0, Some(e.to_string())),
            };

        Ok(TransformResult {
            refined_rows,
            aggregate_rows: aggregate.height(),
            symbols_processed,
            feature_count: FEATURE_COLUMNS.len(),
            partitions_registered,
            catalog_warning,
        })
    }

    fn register(
        &self,
        req: &TransformRequest,
        refined: &DataFrame,
        aggregate: &DataFrame,
    ) -> Result<usize, TransformError> {
        let refined_location = req.refined_root.display().to_string();

        self.catalog.upsert_table(&TableSpec::from_frame(
            REFINED_TABLE,
            refined,
            refined_location.clone(),
            &["trade_date", "symbol"],
        ))?;
        self.catalog.upsert_table(&TableSpec::from_frame(
            AGGREGATE_TABLE,
            aggregate,
            req.aggregate_root.display().to_string(),
            &[],
        ))?;

        let pairs = refined
            .clone()
            .lazy()
            .select([col("trade_date").cast(DataType::String), col("symbol")])
            .unique(None, UniqueKeepStrategy::First)
            .sort(["trade_date", "symbol"], SortMultipleOptions::default())
            .collect()?;
        let dates = pairs.column("trade_date")?.str()?;
        let symbols = pairs.column("symbol")?.str()?;

        let mut created = 0;
        for i in 0..pairs.height() {
            let (Some(date), Some(symbol)) = (dates.get(i), symbols.get(i)) else {
                continue;
            };
            let location = format!("{refined_location}/trade_date={date}/symbol={symbol}");
            let added = self.catalog.add_partition(
                REFINED_TABLE,
                &[date.to_string(), symbol.to_string()],
                &location,
            )?;
            if added == PartitionAdd::Created {
                created += 1;
            }
        }
        Ok(created)
    }
}

/// Columns like `close_petr4` betray a wide per-symbol layout. Name every
/// offender so the caller can see which upstream produced them.
fn reject_wide_layout(df: &DataFrame) -> Result<(), TransformError> {
    let offenders: Vec<String> = df
        .get_column_names_str()
        .iter()
        .filter(|name| {
            name.split_once('_').is_some_and(|(head, rest)| {
                !rest.is_empty() && PRICE_FIELDS.contains(&head.to_ascii_lowercase().as_str())
            })
        })
        .map(|name| name.to_string())
        .collect();

    if offenders.is_empty() {
        return Ok(());
    }
    Err(TransformError::Schema(format!(
        "wide per-symbol columns are not supported, found: {}",
        offenders.join(", ")
    )))
}

fn require_base_columns(df: &DataFrame) -> Result<(), TransformError> {
    let present = df.get_column_names_str();
    let missing: Vec<&str> = BASE_COLUMNS
        .iter()
        .filter(|c| !present.contains(c))
        .copied()
        .collect();

    if missing.is_empty() {
        return Ok(());
    }
    Err(TransformError::Schema(format!(
        "missing required columns: {}",
        missing.join(", ")
    )))
}

/// Clean, sort per symbol, attach the feature set, drop warm-up rows,
/// round every float to two decimals.
fn engineer_features(raw: &DataFrame) -> Result<DataFrame, TransformError> {
    let ordered: Vec<Expr> = BASE_COLUMNS
        .iter()
        .chain(FEATURE_COLUMNS.iter())
        .map(|c| col(*c))
        .collect();

    let refined = raw
        .clone()
        .lazy()
        .with_columns([
            col("symbol").cast(DataType::String),
            col("trade_date").cast(DataType::Date),
            col("open").cast(DataType::Float64),
            col("high").cast(DataType::Float64),
            col("low").cast(DataType::Float64),
            col("close").cast(DataType::Float64),
            col("volume").cast(DataType::Int64),
        ])
        .filter(
            col("symbol")
                .is_not_null()
                .and(col("trade_date").is_not_null())
                .and(col("close").is_not_null()),
        )
        .sort(["symbol", "trade_date"], SortMultipleOptions::default())
        .with_columns(feature_exprs())
        .drop_nulls(None)
        .with_columns([dtype_cols([DataType::Float64]).round(2)])
        .select(ordered)
        .collect()?;
    Ok(refined)
}

fn monthly_rollup(refined: &DataFrame) -> Result<DataFrame, TransformError> {
    let aggregate = refined
        .clone()
        .lazy()
        .group_by([col("symbol"), month_key()])
        .agg(monthly_aggs())
        .with_columns([dtype_cols([DataType::Float64]).round(2)])
        .sort(["symbol", "month"], SortMultipleOptions::default())
        .collect()?;
    Ok(aggregate)
}
