//! The retry ladder: batched first, per-symbol sequential as fallback.
//!
//! Each rung is a bounded retry loop with a fixed inter-attempt delay,
//! expressed as a standalone helper with a three-way outcome so every exit
//! condition (success, distinguished empty, exhausted retries) is testable
//! on its own. There is no backoff and no unbounded loop: the attempt count
//! is the whole budget.

use super::preflight::Preflight;
use super::provider::{FetchError, FetchProgress, PriceProvider};
use crate::domain::PriceObservation;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::time::Duration;

/// Retry policy shared by both rungs of the ladder.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per rung, including the first.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(1500),
        }
    }
}

/// Exit condition of one rung of the ladder.
#[derive(Debug)]
pub enum RungOutcome {
    /// At least one row came back.
    Success {
        rows: Vec<PriceObservation>,
        attempts: u32,
    },
    /// Every attempt succeeded at the transport level but returned no rows.
    Empty { attempts: u32 },
    /// The retry budget ran out; `error` is the last failure seen.
    Failed { error: FetchError, attempts: u32 },
}

/// Run one rung: call `attempt_fn` up to `max_attempts` times with a fixed
/// delay in between. An empty-but-successful response retries exactly like
/// a transport error.
pub fn run_rung(
    scope: &str,
    config: &RetryConfig,
    progress: &dyn FetchProgress,
    mut attempt_fn: impl FnMut() -> Result<Vec<PriceObservation>, FetchError>,
) -> RungOutcome {
    let mut last_error: Option<FetchError> = None;

    for attempt in 1..=config.max_attempts {
        if attempt > 1 && !config.retry_delay.is_zero() {
            std::thread::sleep(config.retry_delay);
        }
        progress.on_attempt(scope, attempt, config.max_attempts);

        match attempt_fn() {
            Ok(rows) if !rows.is_empty() => {
                return RungOutcome::Success {
                    rows,
                    attempts: attempt,
                };
            }
            Ok(_) => {
                progress.on_retry(scope, attempt, &FetchError::EmptyResponse);
            }
            Err(e) => {
                progress.on_retry(scope, attempt, &e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(error) => RungOutcome::Failed {
            error,
            attempts: config.max_attempts,
        },
        None => RungOutcome::Empty {
            attempts: config.max_attempts,
        },
    }
}

/// Result of a full ladder run. Partial coverage is a success: symbols that
/// exhausted their budget are listed in `missing_symbols`, not raised.
#[derive(Debug)]
pub struct FetchReport {
    pub rows: Vec<PriceObservation>,
    pub symbols_covered: Vec<String>,
    pub missing_symbols: Vec<String>,
    /// Attempts spent on the batched rung.
    pub batched_attempts: u32,
    /// Attempts spent per symbol on the sequential fallback rung.
    pub sequential_attempts: BTreeMap<String, u32>,
}

impl FetchReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Wraps one logical "get price history for N symbols over [start, end]"
/// operation with the preflight check and the two-rung fallback ladder.
pub struct RetryFetcher<'a> {
    provider: &'a dyn PriceProvider,
    preflight: &'a dyn Preflight,
    config: RetryConfig,
}

impl<'a> RetryFetcher<'a> {
    pub fn new(
        provider: &'a dyn PriceProvider,
        preflight: &'a dyn Preflight,
        config: RetryConfig,
    ) -> Self {
        Self {
            provider,
            preflight,
            config,
        }
    }

    /// Fetch history for `symbols` over `[start, end]`.
    ///
    /// Ladder:
    /// 1. preflight — a dead network short-circuits with `NoEgress` before
    ///    any retry budget is spent;
    /// 2. batched rung — one request for all symbols, retried;
    /// 3. sequential rung — per-symbol requests, each with its own retry
    ///    loop; a symbol that exhausts its budget is skipped, not fatal.
    ///
    /// If the batched rung raised and the sequential rung produced zero
    /// usable symbols, the retained batched error is returned. An all-empty
    /// run with no error is reported as an empty `FetchReport`, which the
    /// caller maps to its distinguished empty outcome.
    pub fn fetch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        progress: &dyn FetchProgress,
    ) -> Result<FetchReport, FetchError> {
        self.preflight.check()?;

        let batched = run_rung("batched", &self.config, progress, || {
            self.provider.fetch_batch(symbols, start, end)
        });

        let (batched_attempts, batched_error) = match batched {
            RungOutcome::Success { rows, attempts } => {
                let mut report = FetchReport {
                    rows,
                    symbols_covered: Vec::new(),
                    missing_symbols: Vec::new(),
                    batched_attempts: attempts,
                    sequential_attempts: BTreeMap::new(),
                };
                report.symbols_covered = covered_symbols(&report.rows);
                report.missing_symbols = missing_symbols(symbols, &report.symbols_covered);
                return Ok(report);
            }
            RungOutcome::Empty { attempts } => (attempts, None),
            RungOutcome::Failed { error, attempts } => (attempts, Some(error)),
        };

        // Sequential fallback: one bounded loop per symbol.
        let mut rows = Vec::new();
        let mut sequential_attempts = BTreeMap::new();

        for symbol in symbols {
            let outcome = run_rung(symbol, &self.config, progress, || {
                self.provider.fetch_single(symbol, start, end)
            });
            match outcome {
                RungOutcome::Success {
                    rows: mut symbol_rows,
                    attempts,
                } => {
                    rows.append(&mut symbol_rows);
                    sequential_attempts.insert(symbol.clone(), attempts);
                }
                RungOutcome::Empty { attempts } => {
                    progress.on_symbol_skipped(symbol, &FetchError::EmptyResponse);
                    sequential_attempts.insert(symbol.clone(), attempts);
                }
                RungOutcome::Failed { error, attempts } => {
                    progress.on_symbol_skipped(symbol, &error);
                    sequential_attempts.insert(symbol.clone(), attempts);
                }
            }
        }

        if rows.is_empty() {
            if let Some(error) = batched_error {
                return Err(error);
            }
        }

        let symbols_covered = covered_symbols(&rows);
        let missing = missing_symbols(symbols, &symbols_covered);
        Ok(FetchReport {
            rows,
            symbols_covered,
            missing_symbols: missing,
            batched_attempts,
            sequential_attempts,
        })
    }
}

fn covered_symbols(rows: &[PriceObservation]) -> Vec<String> {
    let mut syms: Vec<String> = rows.iter().map(|r| r.symbol.clone()).collect();
    syms.sort();
    syms.dedup();
    syms
}

fn missing_symbols(requested: &[String], covered: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|s| !covered.contains(s))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::preflight::AlwaysReachable;
    use crate::fetch::provider::SilentProgress;
    use crate::fetch::synthetic::SyntheticProvider;
    use std::sync::Mutex;

    /// Provider whose batched and per-symbol behavior is scripted per call.
    struct ScriptedProvider {
        batch_calls: Mutex<u32>,
        /// Batched calls that fail before one succeeds. u32::MAX = always fail.
        batch_failures: u32,
        /// Batched calls return empty instead of erroring.
        batch_empty: bool,
        /// Symbols whose per-symbol fetch always fails.
        broken_symbols: Vec<String>,
        inner: SyntheticProvider,
    }

    impl ScriptedProvider {
        fn new(batch_failures: u32, batch_empty: bool, broken_symbols: &[&str]) -> Self {
            Self {
                batch_calls: Mutex::new(0),
                batch_failures,
                batch_empty,
                broken_symbols: broken_symbols.iter().map(|s| s.to_string()).collect(),
                inner: SyntheticProvider::new(42),
            }
        }
    }

    impl PriceProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch_batch(
            &self,
            symbols: &[String],
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<PriceObservation>, FetchError> {
            let mut calls = self.batch_calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.batch_failures {
                return Err(FetchError::NetworkUnreachable("connection reset".into()));
            }
            if self.batch_empty {
                return Ok(Vec::new());
            }
            self.inner.fetch_batch(symbols, start, end)
        }

        fn fetch_single(
            &self,
            symbol: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<PriceObservation>, FetchError> {
            if self.broken_symbols.iter().any(|s| s == symbol) {
                return Err(FetchError::NetworkUnreachable("connection reset".into()));
            }
            self.inner.fetch_single(symbol, start, end)
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            retry_delay: Duration::ZERO,
        }
    }

    fn symbols() -> Vec<String> {
        vec!["AAA".to_string(), "BBB".to_string()]
    }

    // 2024-01-01 .. 2024-02-23 spans exactly 40 business days.
    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 23).unwrap(),
        )
    }

    #[test]
    fn batched_succeeds_on_third_attempt() {
        let provider = ScriptedProvider::new(2, false, &[]);
        let fetcher = RetryFetcher::new(&provider, &AlwaysReachable, fast_config());
        let (start, end) = range();

        let report = fetcher
            .fetch(&symbols(), start, end, &SilentProgress)
            .unwrap();

        assert_eq!(report.batched_attempts, 3);
        assert_eq!(report.symbols_covered, vec!["AAA", "BBB"]);
        assert!(report.missing_symbols.is_empty());
        // 40 business days per symbol
        assert_eq!(report.rows.len(), 80);
    }

    #[test]
    fn empty_batch_falls_back_to_sequential_with_partial_coverage() {
        let provider = ScriptedProvider::new(0, true, &["BBB"]);
        let fetcher = RetryFetcher::new(&provider, &AlwaysReachable, fast_config());
        let (start, end) = range();

        let report = fetcher
            .fetch(&symbols(), start, end, &SilentProgress)
            .unwrap();

        assert_eq!(report.batched_attempts, 3);
        assert_eq!(report.symbols_covered, vec!["AAA"]);
        assert_eq!(report.missing_symbols, vec!["BBB"]);
        assert_eq!(report.sequential_attempts["BBB"], 3);
        assert_eq!(report.rows.len(), 40);
    }

    #[test]
    fn batched_error_is_reraised_when_sequential_yields_nothing() {
        let provider = ScriptedProvider::new(u32::MAX, false, &["AAA", "BBB"]);
        let fetcher = RetryFetcher::new(&provider, &AlwaysReachable, fast_config());
        let (start, end) = range();

        let err = fetcher
            .fetch(&symbols(), start, end, &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, FetchError::NetworkUnreachable(_)));
    }

    #[test]
    fn all_empty_with_no_error_reports_empty_not_error() {
        struct EmptyProvider;
        impl PriceProvider for EmptyProvider {
            fn name(&self) -> &str {
                "empty"
            }
            fn fetch_batch(
                &self,
                _: &[String],
                _: NaiveDate,
                _: NaiveDate,
            ) -> Result<Vec<PriceObservation>, FetchError> {
                Ok(Vec::new())
            }
            fn fetch_single(
                &self,
                _: &str,
                _: NaiveDate,
                _: NaiveDate,
            ) -> Result<Vec<PriceObservation>, FetchError> {
                Ok(Vec::new())
            }
        }

        let fetcher = RetryFetcher::new(&EmptyProvider, &AlwaysReachable, fast_config());
        let (start, end) = range();
        let report = fetcher
            .fetch(&symbols(), start, end, &SilentProgress)
            .unwrap();

        assert!(report.is_empty());
        assert_eq!(report.missing_symbols, vec!["AAA", "BBB"]);
    }

    #[test]
    fn dead_network_short_circuits_before_any_attempt() {
        struct NoEgressPreflight;
        impl Preflight for NoEgressPreflight {
            fn check(&self) -> Result<(), FetchError> {
                Err(FetchError::NoEgress("dns resolution failed".into()))
            }
        }

        let provider = ScriptedProvider::new(0, false, &[]);
        let fetcher = RetryFetcher::new(&provider, &NoEgressPreflight, fast_config());
        let (start, end) = range();

        let err = fetcher
            .fetch(&symbols(), start, end, &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, FetchError::NoEgress(_)));
        assert_eq!(*provider.batch_calls.lock().unwrap(), 0);
    }

    #[test]
    fn run_rung_counts_attempts_until_success() {
        let calls = Mutex::new(0u32);
        let outcome = run_rung("batched", &fast_config(), &SilentProgress, || {
            let mut c = calls.lock().unwrap();
            *c += 1;
            if *c < 2 {
                Ok(Vec::new())
            } else {
                Ok(vec![PriceObservation {
                    symbol: "AAA".into(),
                    trade_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                    open: 1.0,
                    high: 2.0,
                    low: 0.5,
                    close: 1.5,
                    volume: 10,
                }])
            }
        });
        match outcome {
            RungOutcome::Success { attempts, rows } => {
                assert_eq!(attempts, 2);
                assert_eq!(rows.len(), 1);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }
}
