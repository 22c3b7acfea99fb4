//! Helpers for driving the executor in tests.

use gatekeeper_core::JobResult;
use gatekeeper_core::run::RunReport;
use gatekeeper_runner::{ScriptedOutcomes, ScriptedRunner};
use gatekeeper_scheduler::{ExecutorConfig, WorkflowExecutor};
use std::sync::Arc;
use std::time::Duration;

/// Executor backed by a [`ScriptedRunner`].
pub fn scripted_executor(outcomes: ScriptedOutcomes, config: ExecutorConfig) -> WorkflowExecutor {
    WorkflowExecutor::new(Arc::new(ScriptedRunner::new(outcomes)), config)
}

/// Executor whose successful jobs take `delay`, leaving time to cancel them.
pub fn slow_executor(
    outcomes: ScriptedOutcomes,
    config: ExecutorConfig,
    delay: Duration,
) -> WorkflowExecutor {
    let runner = ScriptedRunner::new(outcomes).with_delay(delay);
    WorkflowExecutor::new(Arc::new(runner), config)
}

/// Variant results of `job`, in matrix order.
pub fn variant_results(report: &RunReport, job: &str) -> Vec<JobResult> {
    report
        .group(job)
        .map(|group| group.variants.iter().map(|v| v.result).collect())
        .unwrap_or_default()
}

/// Assert that a future completes within a timeout.
pub async fn assert_completes_within<F, T>(future: F, timeout: Duration) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(timeout, future)
        .await
        .expect("Operation timed out")
}
