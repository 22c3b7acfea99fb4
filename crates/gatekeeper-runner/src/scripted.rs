//! Runner returning predetermined results, for dry runs and tests.

use crate::runner::{CancelToken, JobContext, JobOutcome, JobRunner};
use async_trait::async_trait;
use gatekeeper_core::{JobResult, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::time::Duration;
use tracing::debug;

/// Predetermined outcomes keyed by display name or job id.
///
/// ```yaml
/// default: success
/// jobs:
///   integration-tests (units=3): failure
///   unit-tests: cancelled
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedOutcomes {
    #[serde(default)]
    pub jobs: BTreeMap<String, JobResult>,
    #[serde(default = "default_result")]
    pub default: JobResult,
}

fn default_result() -> JobResult {
    JobResult::Success
}

impl Default for ScriptedOutcomes {
    fn default() -> Self {
        Self {
            jobs: BTreeMap::new(),
            default: default_result(),
        }
    }
}

impl ScriptedOutcomes {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn with(mut self, name: impl Into<String>, result: JobResult) -> Self {
        self.jobs.insert(name.into(), result);
        self
    }

    /// Display name wins over job id.
    pub fn lookup(&self, display_name: &str, job_id: &str) -> JobResult {
        self.jobs
            .get(display_name)
            .or_else(|| self.jobs.get(job_id))
            .copied()
            .unwrap_or(self.default)
    }
}

/// Runner that reports scripted results without executing anything.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    outcomes: ScriptedOutcomes,
    delay: Option<Duration>,
}

impl ScriptedRunner {
    pub fn new(outcomes: ScriptedOutcomes) -> Self {
        Self {
            outcomes,
            delay: None,
        }
    }

    /// Simulate work taking `delay`; cancellation during it yields `cancelled`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delay only jobs whose scripted result is `success`, so failures
    /// land first and fail-fast has something to cancel.
    fn delay_for(&self, result: JobResult) -> Option<Duration> {
        self.delay.filter(|_| result.is_success())
    }
}

#[async_trait]
impl JobRunner for ScriptedRunner {
    async fn run(&self, ctx: &JobContext, cancel: CancelToken) -> Result<JobOutcome> {
        let result = self.outcomes.lookup(&ctx.display_name, &ctx.job_id);

        if let Some(delay) = self.delay_for(result) {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Ok(JobOutcome::cancelled()),
            }
        } else if cancel.is_cancelled() {
            return Ok(JobOutcome::cancelled());
        }

        debug!(job = %ctx.display_name, result = %result, "Scripted outcome");
        let outcome = JobOutcome::new(result);
        Ok(match result {
            JobResult::Success => JobOutcome {
                exit_code: Some(0),
                ..outcome
            },
            JobResult::Failure => JobOutcome {
                exit_code: Some(1),
                ..outcome.with_diagnostic("scripted failure")
            },
            other => outcome.with_diagnostic(format!("scripted {}", other)),
        })
    }
}
