//! Fetch layer: provider trait, chart-API client, connectivity preflight,
//! and the batched-then-sequential retry ladder.

pub mod chart_api;
pub mod preflight;
pub mod provider;
pub mod retry;
pub mod synthetic;

pub use chart_api::ChartApiProvider;
pub use preflight::{AlwaysReachable, HttpPreflight, Preflight};
pub use provider::{FetchError, FetchProgress, PriceProvider, SilentProgress, StdoutProgress};
pub use retry::{FetchReport, RetryConfig, RetryFetcher, RungOutcome};
pub use synthetic::SyntheticProvider;
