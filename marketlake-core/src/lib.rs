//! MarketLake Core — domain types, fetch ladder, partitioned storage, catalog.
//!
//! This crate contains the building blocks shared by the pipeline stages:
//! - Domain types (price observations, run-scoped raw batches)
//! - Fetch layer: provider trait, chart-API client, synthetic provider,
//!   connectivity preflight, and the batched-then-sequential retry ladder
//! - Store layer: partitioned parquet writer, object-store abstraction,
//!   and the sync + completion-marker protocol
//! - Catalog abstraction with a JSON-file implementation

pub mod catalog;
pub mod domain;
pub mod fetch;
pub mod store;

pub use catalog::{Catalog, CatalogError, ColumnSpec, JsonCatalog, PartitionAdd, TableSpec};
pub use domain::{PriceObservation, RawBatch};
pub use fetch::{
    AlwaysReachable, ChartApiProvider, FetchError, FetchProgress, FetchReport, HttpPreflight,
    Preflight, PriceProvider, RetryConfig, RetryFetcher, SilentProgress, StdoutProgress,
    SyntheticProvider,
};
pub use store::{
    LocalObjectStore, ObjectStore, ObjectStoreSync, PartitionedWriter, StoreError, SyncReport,
    WriteOutcome, COMPLETION_MARKER,
};
