//! Domain types: daily price observations and run-scoped raw batches.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One daily OHLCV observation for a single symbol.
///
/// Upstream gaps in open/high/low/close arrive as `f64::NAN` and are turned
/// into real nulls when the batch is framed for storage. A row is only
/// usable downstream if `close` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// The in-flight result of one ingestion run.
///
/// Tagged with the calendar day the job ran and a run timestamp (`HHMMSS`)
/// that disambiguates multiple runs on the same day. Immutable once written:
/// re-runs land in sibling `run_ts=` partitions, never overwrite.
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub rows: Vec<PriceObservation>,
    pub ingestion_date: NaiveDate,
    pub run_ts: String,
}

impl RawBatch {
    pub fn new(
        rows: Vec<PriceObservation>,
        ingestion_date: NaiveDate,
        run_ts: impl Into<String>,
    ) -> Self {
        Self {
            rows,
            ingestion_date,
            run_ts: run_ts.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Distinct symbols present in the batch, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut syms: Vec<String> = self.rows.iter().map(|r| r.symbol.clone()).collect();
        syms.sort();
        syms.dedup();
        syms
    }

    /// Enforce the `(symbol, trade_date)` uniqueness invariant, keeping the
    /// last observation for each key. Rows come back sorted by key.
    pub fn dedup_keep_last(&mut self) {
        let mut by_key: BTreeMap<(String, NaiveDate), PriceObservation> = BTreeMap::new();
        for row in self.rows.drain(..) {
            by_key.insert((row.symbol.clone(), row.trade_date), row);
        }
        self.rows = by_key.into_values().collect();
    }
}
