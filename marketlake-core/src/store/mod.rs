//! Store layer: partitioned parquet writing, object-store abstraction, and
//! the sync + completion-marker protocol.

pub mod object_store;
pub mod parquet;
pub mod partition;
pub mod sync;

pub use object_store::{LocalObjectStore, ObjectStore};
pub use parquet::{batch_to_frame, read_parquet_tree, write_parquet};
pub use partition::{PartitionedWriter, WriteOutcome};
pub use sync::{ObjectStoreSync, SyncManifest, SyncReport, COMPLETION_MARKER};

use thiserror::Error;

/// Structured error types for storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("dataframe error: {0}")]
    Frame(String),

    #[error("no parquet data under {0}")]
    NoInput(String),

    #[error("partition key '{0}' missing from batch")]
    MissingPartitionKey(String),

    #[error("upload failed for '{key}': {reason}")]
    UploadFailed { key: String, reason: String },

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("object not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}
