//! Price provider trait and structured fetch errors.
//!
//! The PriceProvider trait abstracts over upstream data sources (the chart
//! API, synthetic data) so engines can take test doubles instead of a live
//! network dependency.

use crate::domain::PriceObservation;
use chrono::NaiveDate;
use thiserror::Error;

/// Structured error types for fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Preflight failed outright: the network cannot reach the upstream at
    /// all. Distinct from an HTTP error response, which still counts as
    /// "reachable".
    #[error("no egress to upstream: {0}")]
    NoEgress(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("upstream returned no rows for the requested range")]
    EmptyResponse,

    #[error("fetch error: {0}")]
    Other(String),
}

/// Trait for upstream price-history sources.
///
/// Both entry points are single attempts with a bounded per-call timeout;
/// the retry ladder lives above this trait. Implementations must not fan
/// out concurrently — the upstream penalizes parallel connections from the
/// same caller.
pub trait PriceProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily rows for all symbols in one logical batched request.
    fn fetch_batch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FetchError>;

    /// Fetch daily rows for a single symbol.
    fn fetch_single(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FetchError>;
}

/// Progress callback for the retry ladder.
pub trait FetchProgress: Send {
    /// Called before each attempt of a rung. `scope` is "batched" or a symbol.
    fn on_attempt(&self, scope: &str, attempt: u32, max_attempts: u32);

    /// Called when an attempt fails and will be retried.
    fn on_retry(&self, scope: &str, attempt: u32, error: &FetchError);

    /// Called when a symbol is skipped after exhausting its retry budget.
    fn on_symbol_skipped(&self, symbol: &str, error: &FetchError);
}

/// Progress reporter that prints to stdout.
pub struct StdoutProgress;

impl FetchProgress for StdoutProgress {
    fn on_attempt(&self, scope: &str, attempt: u32, max_attempts: u32) {
        println!("[{scope}] attempt {attempt}/{max_attempts}");
    }

    fn on_retry(&self, scope: &str, attempt: u32, error: &FetchError) {
        println!("[{scope}] attempt {attempt} failed: {error}");
    }

    fn on_symbol_skipped(&self, symbol: &str, error: &FetchError) {
        println!("[{symbol}] skipped after exhausting retries: {error}");
    }
}

/// Progress reporter that swallows everything. Used in tests.
pub struct SilentProgress;

impl FetchProgress for SilentProgress {
    fn on_attempt(&self, _scope: &str, _attempt: u32, _max_attempts: u32) {}
    fn on_retry(&self, _scope: &str, _attempt: u32, _error: &FetchError) {}
    fn on_symbol_skipped(&self, _symbol: &str, _error: &FetchError) {}
}
