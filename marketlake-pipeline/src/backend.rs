//! Compute-backend abstraction for the transform job.
//!
//! The trigger only needs two capabilities: ask which runs of a job are
//! live, and request a new run. `LocalJobBackend` is the file-backed
//! implementation used by the CLI; it enforces a concurrency limit of one
//! live run per job, which is exactly the rejection the trigger reconciles.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Lifecycle state of a transform run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Starting,
    Running,
    Stopping,
    Succeeded,
    Failed,
    Stopped,
}

impl RunState {
    /// Non-terminal states count against the concurrency limit.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }
}

/// One run of a job as reported by the backend.
#[derive(Debug, Clone)]
pub struct JobRun {
    pub run_id: String,
    pub state: RunState,
}

/// Parameters handed to a transform run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformArgs {
    pub bucket: String,
    pub input_prefix: String,
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// The caller may not query run state. The trigger treats this as
    /// "unknown, assume not running" rather than blocking.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The job's concurrency limit was already hit — another run is
    /// covering the same work.
    #[error("concurrent run limit exceeded for job '{0}'")]
    ConcurrentLimitExceeded(String),

    #[error("backend error: {0}")]
    Backend(String),
}

pub trait JobBackend: Send + Sync {
    /// Runs of `job` currently in a non-terminal state.
    fn active_runs(&self, job: &str) -> Result<Vec<JobRun>, BackendError>;

    /// Request a new run. Returns the new run id, or
    /// `ConcurrentLimitExceeded` if a live run already holds the slot.
    fn start_run(&self, job: &str, args: &TransformArgs) -> Result<String, BackendError>;
}

// ── Local file-backed backend ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordedRun {
    run_id: String,
    job: String,
    state: RunState,
    args: TransformArgs,
    started_at: NaiveDateTime,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RunLedger {
    runs: Vec<RecordedRun>,
}

/// Job-run state kept in a single JSON file. Good enough for one host:
/// the pipeline's concurrency story is cooperative, not distributed.
pub struct LocalJobBackend {
    state_path: PathBuf,
}

impl LocalJobBackend {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    fn load(&self) -> Result<RunLedger, BackendError> {
        if !self.state_path.exists() {
            return Ok(RunLedger::default());
        }
        let content = fs::read_to_string(&self.state_path)
            .map_err(|e| BackendError::Backend(format!("read run ledger: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| BackendError::Backend(format!("parse run ledger: {e}")))
    }

    fn save(&self, ledger: &RunLedger) -> Result<(), BackendError> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BackendError::Backend(format!("create ledger dir: {e}")))?;
        }
        let json = serde_json::to_string_pretty(ledger)
            .map_err(|e| BackendError::Backend(format!("serialize run ledger: {e}")))?;
        write_atomic(&self.state_path, json.as_bytes())
            .map_err(|e| BackendError::Backend(format!("write run ledger: {e}")))
    }

    /// Move a run to a terminal state, releasing the job's slot.
    pub fn mark_finished(&self, run_id: &str, state: RunState) -> Result<(), BackendError> {
        let mut ledger = self.load()?;
        let run = ledger
            .runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| BackendError::Backend(format!("unknown run '{run_id}'")))?;
        run.state = state;
        self.save(&ledger)
    }
}

fn write_atomic(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)
}

impl JobBackend for LocalJobBackend {
    fn active_runs(&self, job: &str) -> Result<Vec<JobRun>, BackendError> {
        let ledger = self.load()?;
        Ok(ledger
            .runs
            .iter()
            .filter(|r| r.job == job && r.state.is_live())
            .map(|r| JobRun {
                run_id: r.run_id.clone(),
                state: r.state,
            })
            .collect())
    }

    fn start_run(&self, job: &str, args: &TransformArgs) -> Result<String, BackendError> {
        let mut ledger = self.load()?;

        if ledger.runs.iter().any(|r| r.job == job && r.state.is_live()) {
            return Err(BackendError::ConcurrentLimitExceeded(job.to_string()));
        }

        let run_id = format!("jr-{:06}", ledger.runs.len() + 1);
        ledger.runs.push(RecordedRun {
            run_id: run_id.clone(),
            job: job.to_string(),
            state: RunState::Running,
            args: args.clone(),
            started_at: chrono::Local::now().naive_local(),
        });
        self.save(&ledger)?;
        Ok(run_id)
    }
}
