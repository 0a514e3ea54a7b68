//! Mirror a local partitioned tree into an object store, then publish a
//! completion marker.
//!
//! The marker is the only valid signal that a run's output is complete:
//! it is written strictly after every data object uploaded, and never if
//! any upload failed. Consumers must not read a run's output before
//! observing its marker.

use super::object_store::ObjectStore;
use super::parquet::collect_parquet_files;
use super::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Marker object name, written at the run root after a successful sync.
pub const COMPLETION_MARKER: &str = "_SUCCESS";

/// Minimal marker body: enough to audit what the run uploaded.
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncManifest {
    pub objects: usize,
    pub total_bytes: u64,
    /// blake3 over the sorted `key:size` lines of the upload set.
    pub manifest_hash: String,
}

/// Result of a successful sync, consumed by `publish_marker`.
#[derive(Debug)]
pub struct SyncReport {
    pub objects_uploaded: usize,
    pub total_bytes: u64,
    keys: Vec<String>,
}

impl SyncReport {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

pub struct ObjectStoreSync<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> ObjectStoreSync<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Upload every data file under `local_root`, preserving relative paths
    /// beneath `remote_prefix`. Any single failed upload aborts the whole
    /// sync — partial success is not a state this protocol recognizes.
    pub fn sync(
        &self,
        local_root: &Path,
        bucket: &str,
        remote_prefix: &str,
    ) -> Result<SyncReport, StoreError> {
        let prefix = remote_prefix.trim_matches('/');
        let files = collect_parquet_files(local_root)?;

        let mut keys = Vec::with_capacity(files.len());
        let mut total_bytes = 0u64;

        for path in &files {
            let rel = path
                .strip_prefix(local_root)
                .map_err(|e| StoreError::ObjectStore(e.to_string()))?;
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let key = if prefix.is_empty() {
                rel
            } else {
                format!("{prefix}/{rel}")
            };

            let body = fs::read(path).map_err(|e| StoreError::io(path, e))?;
            total_bytes += body.len() as u64;

            self.store
                .put_object(bucket, &key, &body)
                .map_err(|e| StoreError::UploadFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })?;
            keys.push(key);
        }

        Ok(SyncReport {
            objects_uploaded: keys.len(),
            total_bytes,
            keys,
        })
    }

    /// Write the completion marker for a fully synced run. Returns the
    /// marker's key.
    pub fn publish_marker(
        &self,
        bucket: &str,
        remote_prefix: &str,
        report: &SyncReport,
    ) -> Result<String, StoreError> {
        let prefix = remote_prefix.trim_matches('/');
        let key = if prefix.is_empty() {
            COMPLETION_MARKER.to_string()
        } else {
            format!("{prefix}/{COMPLETION_MARKER}")
        };

        let manifest = SyncManifest {
            objects: report.objects_uploaded,
            total_bytes: report.total_bytes,
            manifest_hash: manifest_hash(report),
        };
        let body = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| StoreError::ObjectStore(format!("marker serialization: {e}")))?;

        self.store.put_object(bucket, &key, &body)?;
        Ok(key)
    }
}

fn manifest_hash(report: &SyncReport) -> String {
    let mut hasher = blake3::Hasher::new();
    for key in &report.keys {
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
    }
    hasher.update(&report.total_bytes.to_le_bytes());
    hasher.finalize().to_hex().to_string()
}
