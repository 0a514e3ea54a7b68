//! Decision-table tests for the orchestration trigger against a scripted
//! backend.

use marketlake_pipeline::backend::{BackendError, JobBackend, JobRun, RunState, TransformArgs};
use marketlake_pipeline::trigger::{Decision, OrchestrationTrigger, TriggerSignal};
use std::sync::Mutex;

/// Backend double that answers from a script and records start calls.
struct MockBackend {
    active: Result<Vec<JobRun>, BackendError>,
    start: Result<String, BackendError>,
    started_with: Mutex<Vec<TransformArgs>>,
}

impl MockBackend {
    fn new(active: Result<Vec<JobRun>, BackendError>, start: Result<String, BackendError>) -> Self {
        Self {
            active,
            start,
            started_with: Mutex::new(Vec::new()),
        }
    }

    fn idle() -> Result<Vec<JobRun>, BackendError> {
        Ok(Vec::new())
    }

    fn start_calls(&self) -> Vec<TransformArgs> {
        self.started_with.lock().unwrap().clone()
    }
}

fn clone_backend_err(e: &BackendError) -> BackendError {
    match e {
        BackendError::AccessDenied(s) => BackendError::AccessDenied(s.clone()),
        BackendError::ConcurrentLimitExceeded(s) => {
            BackendError::ConcurrentLimitExceeded(s.clone())
        }
        BackendError::Backend(s) => BackendError::Backend(s.clone()),
    }
}

impl JobBackend for MockBackend {
    fn active_runs(&self, _job: &str) -> Result<Vec<JobRun>, BackendError> {
        match &self.active {
            Ok(runs) => Ok(runs.clone()),
            Err(e) => Err(clone_backend_err(e)),
        }
    }

    fn start_run(&self, _job: &str, args: &TransformArgs) -> Result<String, BackendError> {
        self.started_with.lock().unwrap().push(args.clone());
        match &self.start {
            Ok(id) => Ok(id.clone()),
            Err(e) => Err(clone_backend_err(e)),
        }
    }
}

fn marker_notification() -> TriggerSignal {
    TriggerSignal::Notification {
        bucket: "lake".into(),
        key: "raw/ingestion_date=2024-01-05/run_ts=120000/_SUCCESS".into(),
    }
}

#[test]
fn idle_job_starts_with_the_marker_run_prefix() {
    let backend = MockBackend::new(MockBackend::idle(), Ok("jr-000001".into()));
    let trigger = OrchestrationTrigger::new(&backend, "transform_job");

    let decision = trigger.on_signal(&marker_notification()).unwrap();
    assert_eq!(
        decision,
        Decision::Started {
            run_id: "jr-000001".into()
        }
    );

    let calls = backend.start_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].bucket, "lake");
    assert_eq!(
        calls[0].input_prefix,
        "raw/ingestion_date=2024-01-05/run_ts=120000/"
    );
}

#[test]
fn live_run_skips_without_calling_start() {
    let backend = MockBackend::new(
        Ok(vec![JobRun {
            run_id: "jr-000001".into(),
            state: RunState::Running,
        }]),
        Ok("jr-000002".into()),
    );
    let trigger = OrchestrationTrigger::new(&backend, "transform_job");

    let decision = trigger.on_signal(&marker_notification()).unwrap();
    assert_eq!(decision, Decision::SkippedAlreadyRunning);
    assert!(backend.start_calls().is_empty());
}

#[test]
fn terminal_runs_do_not_block_a_new_start() {
    let backend = MockBackend::new(
        Ok(vec![JobRun {
            run_id: "jr-000001".into(),
            state: RunState::Succeeded,
        }]),
        Ok("jr-000002".into()),
    );
    let trigger = OrchestrationTrigger::new(&backend, "transform_job");

    let decision = trigger.on_signal(&marker_notification()).unwrap();
    assert!(matches!(decision, Decision::Started { .. }));
}

#[test]
fn lost_race_downgrades_to_a_skip() {
    // Pre-check saw nothing live, but start hits the concurrency limit:
    // another trigger won the race between check and act.
    let backend = MockBackend::new(
        MockBackend::idle(),
        Err(BackendError::ConcurrentLimitExceeded("transform_job".into())),
    );
    let trigger = OrchestrationTrigger::new(&backend, "transform_job");

    let decision = trigger.on_signal(&marker_notification()).unwrap();
    assert_eq!(decision, Decision::SkippedConcurrentLimit);
    assert_eq!(decision.status_code(), 202);
}

#[test]
fn denied_state_query_still_attempts_the_start() {
    let backend = MockBackend::new(
        Err(BackendError::AccessDenied("no GetJobRuns".into())),
        Ok("jr-000001".into()),
    );
    let trigger = OrchestrationTrigger::new(&backend, "transform_job");

    let decision = trigger.on_signal(&marker_notification()).unwrap();
    assert!(matches!(decision, Decision::Started { .. }));
    assert_eq!(backend.start_calls().len(), 1);
}

#[test]
fn backend_failure_on_start_is_an_error_not_a_decision() {
    let backend = MockBackend::new(
        MockBackend::idle(),
        Err(BackendError::Backend("service unavailable".into())),
    );
    let trigger = OrchestrationTrigger::new(&backend, "transform_job");

    assert!(trigger.on_signal(&marker_notification()).is_err());
}

#[test]
fn bad_signals_are_rejected_with_a_reason() {
    let backend = MockBackend::new(MockBackend::idle(), Ok("jr-000001".into()));
    let trigger = OrchestrationTrigger::new(&backend, "transform_job");

    let cases = [
        TriggerSignal::Notification {
            bucket: String::new(),
            key: "raw/x/_SUCCESS".into(),
        },
        TriggerSignal::Notification {
            bucket: "lake".into(),
            key: "_SUCCESS".into(),
        },
        TriggerSignal::Manual {
            bucket: "lake".into(),
            key: None,
            prefix: None,
        },
        TriggerSignal::Manual {
            bucket: "lake".into(),
            key: None,
            prefix: Some(String::new()),
        },
    ];

    for signal in &cases {
        let decision = trigger.on_signal(signal).unwrap();
        assert!(
            matches!(decision, Decision::RejectedBadSignal { .. }),
            "signal {signal:?} should be rejected, got {decision:?}"
        );
        assert_eq!(decision.status_code(), 400);
    }
    assert!(backend.start_calls().is_empty());
}

#[test]
fn manual_prefix_gains_a_trailing_slash() {
    let backend = MockBackend::new(MockBackend::idle(), Ok("jr-000001".into()));
    let trigger = OrchestrationTrigger::new(&backend, "transform_job");

    let signal = TriggerSignal::Manual {
        bucket: "lake".into(),
        key: None,
        prefix: Some("raw/ingestion_date=2024-01-05/run_ts=120000".into()),
    };
    trigger.on_signal(&signal).unwrap();

    assert_eq!(
        backend.start_calls()[0].input_prefix,
        "raw/ingestion_date=2024-01-05/run_ts=120000/"
    );
}
