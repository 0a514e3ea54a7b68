//! Synthetic price provider.
//!
//! Deterministic seeded random-walk OHLCV over business days. Used by the
//! CLI's offline mode and as a fixture generator in tests: the same seed
//! and symbol always produce the same series.

use super::provider::{FetchError, PriceProvider};
use crate::domain::PriceObservation;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Provider that fabricates plausible daily bars instead of hitting the
/// network. Never fails.
pub struct SyntheticProvider {
    seed: u64,
}

impl SyntheticProvider {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn symbol_rng(&self, symbol: &str) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(symbol.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.as_bytes()[..8]);
        StdRng::seed_from_u64(u64::from_le_bytes(bytes))
    }

    fn generate(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<PriceObservation> {
        let mut rng = self.symbol_rng(symbol);
        let mut close: f64 = 20.0 + rng.gen_range(0.0..80.0);
        let mut rows = Vec::new();

        let mut day = start;
        while day <= end {
            let weekday = day.weekday();
            if weekday != Weekday::Sat && weekday != Weekday::Sun {
                let open = close * (1.0 + rng.gen_range(-0.01..0.01));
                close = (close * (1.0 + rng.gen_range(-0.03..0.03))).max(1.0);
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
                rows.push(PriceObservation {
                    symbol: symbol.to_string(),
                    trade_date: day,
                    open,
                    high,
                    low,
                    close,
                    volume: rng.gen_range(100_000..10_000_000),
                });
            }
            day += Duration::days(1);
        }

        rows
    }
}

impl PriceProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_batch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FetchError> {
        let mut rows = Vec::new();
        for symbol in symbols {
            rows.extend(self.generate(symbol, start, end));
        }
        Ok(rows)
    }

    fn fetch_single(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FetchError> {
        Ok(self.generate(symbol, start, end))
    }
}
