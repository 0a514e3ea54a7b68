//! Orchestration trigger: the single start/skip decision between ingestion
//! and transform.
//!
//! The trigger guarantees at most one live transform run per job. The
//! check-then-act gap between "query active runs" and "start run" is real;
//! rather than pretending the check suffices, the backend's own
//! concurrent-limit rejection is treated as a success-equivalent outcome —
//! it means another run is already covering the same work.

use crate::backend::{BackendError, JobBackend, TransformArgs};
use thiserror::Error;

/// An incoming signal: either a storage-change notification for an object
/// key, or a manual invocation carrying a key or an explicit prefix.
#[derive(Debug, Clone)]
pub enum TriggerSignal {
    Notification { bucket: String, key: String },
    Manual {
        bucket: String,
        key: Option<String>,
        prefix: Option<String>,
    },
}

impl TriggerSignal {
    /// Resolve to `(bucket, prefix)`. A key resolves to its parent
    /// "directory"; a signal with no resolvable prefix is rejected.
    fn resolve(&self) -> Result<(String, String), String> {
        let (bucket, key, prefix) = match self {
            Self::Notification { bucket, key } => (bucket, Some(key.as_str()), None),
            Self::Manual {
                bucket,
                key,
                prefix,
            } => (bucket, key.as_deref(), prefix.as_deref()),
        };

        if bucket.is_empty() {
            return Err("signal has no bucket".to_string());
        }

        if let Some(prefix) = prefix {
            if prefix.is_empty() {
                return Err("signal has an empty prefix".to_string());
            }
            let mut prefix = prefix.to_string();
            if !prefix.ends_with('/') {
                prefix.push('/');
            }
            return Ok((bucket.clone(), prefix));
        }

        let key = key.ok_or_else(|| "signal has neither key nor prefix".to_string())?;
        let prefix = prefix_from_key(key)
            .ok_or_else(|| format!("key '{key}' has no parent prefix"))?;
        Ok((bucket.clone(), prefix))
    }
}

/// Derive a dataset prefix from an object key by dropping the final path
/// segment. The completion marker resolves to its run's root this way.
pub fn prefix_from_key(key: &str) -> Option<String> {
    let (parent, _) = key.rsplit_once('/')?;
    if parent.is_empty() {
        return None;
    }
    Some(format!("{parent}/"))
}

/// The four-way outcome of a trigger invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Started { run_id: String },
    SkippedAlreadyRunning,
    SkippedConcurrentLimit,
    RejectedBadSignal { reason: String },
}

impl Decision {
    /// HTTP-style status for the trigger's outward contract:
    /// 200 started, 202 skipped, 400 malformed signal.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Started { .. } => 200,
            Self::SkippedAlreadyRunning | Self::SkippedConcurrentLimit => 202,
            Self::RejectedBadSignal { .. } => 400,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Started { run_id } => format!("transform run started: {run_id}"),
            Self::SkippedAlreadyRunning => {
                "job already running; trigger skipped".to_string()
            }
            Self::SkippedConcurrentLimit => {
                "concurrency limit hit; another run covers this work".to_string()
            }
            Self::RejectedBadSignal { reason } => format!("bad signal: {reason}"),
        }
    }
}

/// Errors the trigger cannot downgrade: the backend failed in a way that
/// is neither a benign race nor a permission gap.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

pub struct OrchestrationTrigger<'a> {
    backend: &'a dyn JobBackend,
    job_name: String,
}

impl<'a> OrchestrationTrigger<'a> {
    pub fn new(backend: &'a dyn JobBackend, job_name: impl Into<String>) -> Self {
        Self {
            backend,
            job_name: job_name.into(),
        }
    }

    pub fn on_signal(&self, signal: &TriggerSignal) -> Result<Decision, TriggerError> {
        let (bucket, prefix) = match signal.resolve() {
            Ok(resolved) => resolved,
            Err(reason) => return Ok(Decision::RejectedBadSignal { reason }),
        };

        // Best-effort pre-check. A permission gap means "unknown, assume
        // not running" — the start call below is the real gate.
        let already_running = match self.backend.active_runs(&self.job_name) {
            Ok(runs) => runs.iter().any(|r| r.state.is_live()),
            Err(BackendError::AccessDenied(_)) => false,
            Err(e) => return Err(e.into()),
        };

        if already_running {
            return Ok(Decision::SkippedAlreadyRunning);
        }

        let args = TransformArgs {
            bucket,
            input_prefix: prefix,
        };

        match self.backend.start_run(&self.job_name, &args) {
            Ok(run_id) => Ok(Decision::Started { run_id }),
            Err(BackendError::ConcurrentLimitExceeded(_)) => {
                Ok(Decision::SkippedConcurrentLimit)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_key_resolves_to_run_root() {
        assert_eq!(
            prefix_from_key("raw/ingestion_date=2024-01-05/run_ts=120000/_SUCCESS"),
            Some("raw/ingestion_date=2024-01-05/run_ts=120000/".to_string())
        );
    }

    #[test]
    fn bare_key_has_no_prefix() {
        assert_eq!(prefix_from_key("_SUCCESS"), None);
        assert_eq!(prefix_from_key("/orphan"), None);
    }

    #[test]
    fn status_codes_match_the_outward_contract() {
        assert_eq!(
            Decision::Started {
                run_id: "jr-000001".into()
            }
            .status_code(),
            200
        );
        assert_eq!(Decision::SkippedAlreadyRunning.status_code(), 202);
        assert_eq!(Decision::SkippedConcurrentLimit.status_code(), 202);
        assert_eq!(
            Decision::RejectedBadSignal {
                reason: "x".into()
            }
            .status_code(),
            400
        );
    }
}
