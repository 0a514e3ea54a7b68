//! Object-store abstraction.
//!
//! The pipeline mutates shared storage only through this trait, so engines
//! take an explicitly constructed store capability instead of a global
//! client handle, and tests swap in doubles. `LocalObjectStore` is the
//! filesystem-backed implementation used by the CLI and tests: one
//! directory per bucket, keys as relative paths.

use super::StoreError;
use std::fs;
use std::path::{Path, PathBuf};

pub trait ObjectStore: Send + Sync {
    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), StoreError>;

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// All keys under `prefix`, sorted. An empty prefix lists the bucket.
    fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Filesystem-backed object store.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Local directory backing a bucket.
    pub fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        if key.split('/').any(|seg| seg == "..") || key.starts_with('/') {
            return Err(StoreError::ObjectStore(format!("invalid key '{key}'")));
        }
        Ok(self.bucket_path(bucket).join(key))
    }
}

impl ObjectStore for LocalObjectStore {
    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        fs::write(&path, body).map_err(|e| StoreError::io(&path, e))
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(bucket, key)?;
        if !path.exists() {
            return Err(StoreError::NotFound(format!("{bucket}/{key}")));
        }
        fs::read(&path).map_err(|e| StoreError::io(&path, e))
    }

    fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let bucket_dir = self.bucket_path(bucket);
        if !bucket_dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        collect_keys(&bucket_dir, &bucket_dir, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

fn collect_keys(base: &Path, dir: &Path, keys: &mut Vec<String>) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_keys(base, &path, keys)?;
        } else {
            let rel = path
                .strip_prefix(base)
                .map_err(|e| StoreError::ObjectStore(e.to_string()))?;
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            keys.push(key);
        }
    }
    Ok(())
}
