//! Pipeline configuration, loaded from a TOML file with per-field
//! defaults so a minimal config stays minimal.

use marketlake_core::fetch::RetryConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("cannot parse config {path}: {reason}")]
    Parse { path: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Logical bucket name inside the object store root.
    pub bucket: String,
    pub symbols: Vec<String>,
    /// Days of history to ingest, counted back from the run date.
    pub lookback_days: u32,
    /// Object store root directory.
    pub data_root: PathBuf,
    /// Local scratch tree for partition staging before upload.
    pub staging_dir: PathBuf,
    /// Catalog database directory.
    pub catalog_dir: PathBuf,
    /// Run-ledger file for the local job backend.
    pub run_ledger: PathBuf,
    pub job_name: String,
    /// Chart API base URL, no trailing slash.
    pub endpoint: String,
    pub retry: RetrySettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket: "marketlake".to_string(),
            symbols: vec![
                "ITUB4.SA".to_string(),
                "BBDC4.SA".to_string(),
                "BBAS3.SA".to_string(),
            ],
            lookback_days: 180,
            data_root: PathBuf::from("data/store"),
            staging_dir: PathBuf::from("data/staging"),
            catalog_dir: PathBuf::from("data/catalog"),
            run_ledger: PathBuf::from("data/runs.json"),
            job_name: "transform_job".to_string(),
            endpoint: "https://query2.finance.yahoo.com".to_string(),
            retry: RetrySettings::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Load from `path` if given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_attempts,
            retry_delay: Duration::from_millis(self.retry.retry_delay_ms),
        }
    }
}
