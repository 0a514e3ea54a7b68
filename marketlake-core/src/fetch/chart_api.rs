//! Chart-API price provider.
//!
//! Fetches daily OHLCV history from a Yahoo-style v8 chart endpoint. The
//! response is a wide layout keyed by symbol-plus-field (one column set per
//! symbol); this module is the single seam where that layout is normalized
//! into tall `(symbol, trade_date)` rows. Everything downstream only ever
//! sees the canonical tall form.
//!
//! Each call is one attempt with a short timeout — the retry ladder above
//! this provider owns all retry policy. Requests are strictly sequential:
//! the upstream rate-limits concurrent connections from the same caller.

use super::provider::{FetchError, PriceProvider};
use crate::domain::PriceObservation;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

/// Chart API v8 response envelope.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<i64>>,
}

/// HTTP provider against a chart-style endpoint.
pub struct ChartApiProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl ChartApiProvider {
    /// Build a provider against the given base URL (no trailing slash).
    ///
    /// The per-call timeout stays under the 20-second budget the ingestion
    /// stage allows for a single attempt.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
        let end_ts = end.and_hms_opt(23, 59, 59).unwrap().and_utc().timestamp();
        format!(
            "{}/v8/finance/chart/{symbol}?period1={start_ts}&period2={end_ts}&interval=1d",
            self.base_url
        )
    }

    /// Normalize the per-symbol column arrays into tall rows.
    fn parse_response(
        symbol: &str,
        resp: ChartResponse,
    ) -> Result<Vec<PriceObservation>, FetchError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    FetchError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    FetchError::ResponseFormat(format!("{}: {}", err.code, err.description))
                }
            } else {
                FetchError::ResponseFormat("empty result with no error".into())
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::ResponseFormat("result array is empty".into()))?;

        let timestamps = data
            .timestamp
            .ok_or_else(|| FetchError::ResponseFormat("no timestamps".into()))?;

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::ResponseFormat("no quote data".into()))?;

        let mut rows = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let trade_date = chrono::DateTime::from_timestamp(ts, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| FetchError::ResponseFormat(format!("invalid timestamp: {ts}")))?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();

            // All-None slots are holidays/non-trading days
            if open.is_none()
                && high.is_none()
                && low.is_none()
                && close.is_none()
                && volume.is_none()
            {
                continue;
            }

            rows.push(PriceObservation {
                symbol: symbol.to_string(),
                trade_date,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume: volume.unwrap_or(0),
            });
        }

        Ok(rows)
    }

    /// One HTTP attempt for one symbol. No internal retries.
    fn fetch_once(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FetchError> {
        let url = self.chart_url(symbol, start, end);

        let resp = match self.client.get(&url).send() {
            Ok(resp) => resp,
            Err(e) => return Err(FetchError::NetworkUnreachable(e.to_string())),
        };

        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(FetchError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        if !status.is_success() {
            return Err(FetchError::Other(format!("HTTP {status} for {symbol}")));
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            FetchError::ResponseFormat(format!("failed to parse response for {symbol}: {e}"))
        })?;

        Self::parse_response(symbol, chart)
    }
}

impl PriceProvider for ChartApiProvider {
    fn name(&self) -> &str {
        "chart_api"
    }

    /// The wire API is per-symbol, so the batched request is a sequential
    /// sweep presented as one logical call: a transport error for any
    /// symbol fails the whole batch, an unknown symbol is skipped.
    fn fetch_batch(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FetchError> {
        let mut rows = Vec::new();
        for symbol in symbols {
            match self.fetch_once(symbol, start, end) {
                Ok(mut symbol_rows) => rows.append(&mut symbol_rows),
                Err(FetchError::SymbolNotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(rows)
    }

    fn fetch_single(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FetchError> {
        self.fetch_once(symbol, start, end)
    }
}
