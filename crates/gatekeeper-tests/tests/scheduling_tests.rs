//! Scheduling behaviour: fail-fast, max-parallel, cancellation, skips.

use async_trait::async_trait;
use gatekeeper_core::JobResult;
use gatekeeper_core::workflow::TriggerEvent;
use gatekeeper_runner::{
    CancelToken, JobContext, JobOutcome, JobRunner, ScriptedOutcomes, cancel_pair,
};
use gatekeeper_scheduler::{ExecutorConfig, ExecutorError, WorkflowExecutor};
use gatekeeper_tests::{
    GATE_JOB, WorkflowFixture, assert_completes_within, init_test_logging, scripted_executor,
    slow_executor, variant_results,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const FAILING_VARIANT: &str = "Integration tests (config=file, units=1)";

fn failing_variant() -> ScriptedOutcomes {
    ScriptedOutcomes::default().with(FAILING_VARIANT, JobResult::Failure)
}

#[tokio::test]
async fn test_fail_fast_cancels_sibling_variants() {
    init_test_logging();
    let workflow = WorkflowFixture::integration();
    let executor = slow_executor(
        failing_variant(),
        WorkflowFixture::config(),
        Duration::from_millis(500),
    );

    let report = assert_completes_within(
        executor.execute(&workflow, CancelToken::never()),
        Duration::from_secs(10),
    )
    .await
    .unwrap();

    let group = report.group("integration-tests").unwrap();
    assert_eq!(group.result, JobResult::Failure);
    for variant in &group.variants {
        let expected = if variant.display_name == FAILING_VARIANT {
            JobResult::Failure
        } else {
            JobResult::Cancelled
        };
        assert_eq!(variant.result, expected, "{}", variant.display_name);
    }

    // Fail-fast is scoped to the group.
    assert_eq!(
        report.result_of("storage-integration-tests"),
        Some(JobResult::Success)
    );
    assert_eq!(report.result_of(GATE_JOB), Some(JobResult::Success));
    assert!(!report.success());
}

#[tokio::test]
async fn test_without_fail_fast_all_variants_finish() {
    init_test_logging();
    let workflow = WorkflowFixture::integration_without_fail_fast();
    let executor = slow_executor(
        failing_variant(),
        WorkflowFixture::config(),
        Duration::from_millis(100),
    );

    let report = executor
        .execute(&workflow, CancelToken::never())
        .await
        .unwrap();

    let results = variant_results(&report, "integration-tests");
    assert_eq!(results.len(), 4);
    assert_eq!(
        results.iter().filter(|r| **r == JobResult::Success).count(),
        3
    );
    assert_eq!(
        results.iter().filter(|r| **r == JobResult::Failure).count(),
        1
    );
    assert_eq!(report.result_of("integration-tests"), Some(JobResult::Failure));
}

#[tokio::test]
async fn test_run_cancellation_still_runs_always_jobs() {
    init_test_logging();
    let workflow = WorkflowFixture::integration();
    let executor = slow_executor(
        ScriptedOutcomes::default(),
        WorkflowFixture::config(),
        Duration::from_millis(500),
    );
    let (handle, token) = cancel_pair();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });

    let report = assert_completes_within(executor.execute(&workflow, token), Duration::from_secs(10))
        .await
        .unwrap();
    canceller.await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.result_of("integration-tests"), Some(JobResult::Cancelled));
    assert_eq!(
        report.result_of("storage-integration-tests"),
        Some(JobResult::Cancelled)
    );
    assert_eq!(report.result_of(GATE_JOB), Some(JobResult::Success));

    let verdict = report.gate.as_ref().unwrap();
    assert_eq!(verdict.failures().count(), 2);
    assert!(!report.success());
}

#[tokio::test]
async fn test_cancelled_before_start_marks_pending_jobs() {
    init_test_logging();
    let workflow = WorkflowFixture::chain();
    let (handle, token) = cancel_pair();
    handle.cancel();

    let report = scripted_executor(ScriptedOutcomes::default(), WorkflowFixture::config())
        .execute(&workflow, token)
        .await
        .unwrap();

    assert_eq!(report.result_of("build"), Some(JobResult::Cancelled));
    assert_eq!(report.result_of("test"), Some(JobResult::Cancelled));
    assert_eq!(
        report.group("test").unwrap().reason.as_deref(),
        Some("run was cancelled")
    );
    // failure() is false because nothing failed.
    assert_eq!(report.result_of("notify-failure"), Some(JobResult::Cancelled));
    assert_eq!(report.result_of(GATE_JOB), Some(JobResult::Success));
}

#[tokio::test]
async fn test_skip_propagates_through_chain() {
    init_test_logging();
    let workflow = WorkflowFixture::chain();
    let outcomes = ScriptedOutcomes::default().with("build", JobResult::Failure);

    let report = scripted_executor(outcomes, WorkflowFixture::config())
        .execute(&workflow, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.result_of("build"), Some(JobResult::Failure));
    assert_eq!(report.result_of("test"), Some(JobResult::Skipped));
    assert_eq!(report.result_of("publish"), Some(JobResult::Skipped));
    // An ancestor failed, so failure() holds two levels down.
    assert_eq!(report.result_of("notify-failure"), Some(JobResult::Success));
    assert_eq!(report.result_of(GATE_JOB), Some(JobResult::Success));

    let order: Vec<&str> = report.groups.iter().map(|g| g.job.as_str()).collect();
    let position = |job: &str| order.iter().position(|j| *j == job).unwrap();
    assert!(position("build") < position("test"));
    assert!(position("test") < position("publish"));
    assert!(position("publish") < position(GATE_JOB));
}

/// Runner that records the highest number of jobs running at once.
#[derive(Default)]
struct ConcurrencyTracker {
    running: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl JobRunner for ConcurrencyTracker {
    async fn run(
        &self,
        _ctx: &JobContext,
        _cancel: CancelToken,
    ) -> gatekeeper_core::Result<JobOutcome> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(JobOutcome::new(JobResult::Success))
    }
}

#[tokio::test]
async fn test_matrix_max_parallel_bounds_variants() {
    init_test_logging();
    let yaml = r#"
name: Bounded
on: pull_request
jobs:
  integration-tests:
    strategy:
      max-parallel: 2
      matrix:
        units: [1, 2, 3, 4, 5]
    steps:
      - run: tox
"#;
    let workflow = WorkflowFixture::parse(yaml);
    let tracker = Arc::new(ConcurrencyTracker::default());
    let executor = WorkflowExecutor::new(tracker.clone(), ExecutorConfig::default());

    let report = executor
        .execute(&workflow, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(variant_results(&report, "integration-tests").len(), 5);
    assert_eq!(tracker.peak.load(Ordering::SeqCst), 2);
    assert!(report.success());
}

#[tokio::test]
async fn test_run_max_parallel_bounds_all_groups() {
    init_test_logging();
    let workflow = WorkflowFixture::integration();
    let tracker = Arc::new(ConcurrencyTracker::default());
    let config = ExecutorConfig {
        max_parallel: Some(1),
        ..WorkflowFixture::config()
    };

    let report = WorkflowExecutor::new(tracker.clone(), config)
        .execute(&workflow, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
    assert!(report.success());
}

#[tokio::test]
async fn test_trigger_and_input_checks() {
    init_test_logging();
    let workflow = WorkflowFixture::integration();

    let feature_push = ExecutorConfig {
        event: TriggerEvent::Push,
        ref_name: Some("feature/x".to_string()),
        ..WorkflowFixture::config()
    };
    let err = scripted_executor(ScriptedOutcomes::default(), feature_push)
        .execute(&workflow, CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::NotTriggered { .. }));

    let track_push = ExecutorConfig {
        event: TriggerEvent::Push,
        ref_name: Some("track/2.x".to_string()),
        ..WorkflowFixture::config()
    };
    let report = scripted_executor(ScriptedOutcomes::default(), track_push)
        .execute(&workflow, CancelToken::never())
        .await
        .unwrap();
    assert!(report.success());

    let bad_images = ExecutorConfig {
        inputs: [("images".to_string(), "wordpress:6.4".to_string())].into(),
        ..WorkflowFixture::config()
    };
    let err = scripted_executor(ScriptedOutcomes::default(), bad_images)
        .execute(&workflow, CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::Input(_)));

    let called_without_secret = ExecutorConfig {
        event: TriggerEvent::WorkflowCall,
        ..WorkflowFixture::config()
    };
    let err = scripted_executor(ScriptedOutcomes::default(), called_without_secret)
        .execute(&workflow, CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::Input(_)));
}
