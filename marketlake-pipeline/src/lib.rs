//! Batch pipeline stages over the marketlake core: ingestion, the
//! orchestration trigger, and the transform engine, plus the local job
//! backend and file configuration that wire them together.
//!
//! Each stage is a capability-taking engine — providers, stores, backends
//! and catalogs come in as trait objects, so tests and the CLI compose the
//! same code with different edges.

pub mod backend;
pub mod config;
pub mod features;
pub mod ingest;
pub mod transform;
pub mod trigger;

pub use backend::{BackendError, JobBackend, JobRun, LocalJobBackend, RunState, TransformArgs};
pub use config::{ConfigError, PipelineConfig, RetrySettings};
pub use ingest::{IngestError, IngestOutcome, IngestRequest, IngestStats, IngestionEngine};
pub use transform::{
    TransformEngine, TransformError, TransformRequest, TransformResult, AGGREGATE_TABLE,
    REFINED_TABLE,
};
pub use trigger::{Decision, OrchestrationTrigger, TriggerError, TriggerSignal};
