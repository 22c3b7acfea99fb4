//! Core runner trait and types.

use async_trait::async_trait;
use gatekeeper_core::JobResult;
use gatekeeper_core::Result;
use gatekeeper_core::expression::ExpressionContext;
use gatekeeper_core::workflow::JobDefinition;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::watch;
use tokio::time::Duration;

/// Everything a runner needs to execute one matrix variant.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub display_name: String,
    pub definition: JobDefinition,
    /// Inputs, matrix values, needs, env and secrets visible to the job.
    pub expressions: ExpressionContext,
    pub workspace: PathBuf,
    pub timeout: Option<Duration>,
}

/// Outcome of running one matrix variant.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub result: JobResult,
    pub exit_code: Option<i32>,
    pub outputs: BTreeMap<String, String>,
    pub diagnostic: Option<String>,
}

impl JobOutcome {
    pub fn new(result: JobResult) -> Self {
        Self {
            result,
            exit_code: None,
            outputs: BTreeMap::new(),
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn cancelled() -> Self {
        Self::new(JobResult::Cancelled).with_diagnostic("cancelled before completion")
    }
}

/// Trait for job execution.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run a job variant to completion, stopping early once `cancel` fires.
    async fn run(&self, ctx: &JobContext, cancel: CancelToken) -> Result<JobOutcome>;
}

/// Configuration for job execution.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Shell used for `run` steps that do not name one.
    pub shell: String,
    /// Upper bound for jobs without `timeout-minutes`.
    pub default_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            default_timeout: Some(Duration::from_secs(6 * 60 * 60)),
        }
    }
}

/// Sending half of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            receivers: vec![self.tx.subscribe()],
        }
    }
}

/// Receiving half of one or more cancellation signals. Fires when any of
/// its sources fires.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    receivers: Vec<watch::Receiver<bool>>,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { receivers: vec![rx] })
}

impl CancelToken {
    /// A token that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.receivers.iter().any(|rx| *rx.borrow())
    }

    /// A token firing when either `self` or `other` fires.
    pub fn union(&self, other: &CancelToken) -> Self {
        let mut receivers = self.receivers.clone();
        receivers.extend(other.receivers.iter().cloned());
        Self { receivers }
    }

    /// Resolve once cancellation is signalled. Never resolves if every
    /// sender is dropped without cancelling.
    pub async fn cancelled(&self) {
        if self.receivers.is_empty() {
            return std::future::pending().await;
        }

        let waits = self.receivers.iter().cloned().map(|mut rx| {
            Box::pin(async move {
                loop {
                    if *rx.borrow_and_update() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
            })
        });
        futures::future::select_all(waits).await;
    }
}
