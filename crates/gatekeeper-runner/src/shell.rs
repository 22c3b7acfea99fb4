//! Shell-based job execution on the host.

use crate::runner::{CancelToken, JobContext, JobOutcome, JobRunner, RunnerConfig};
use async_trait::async_trait;
use command_group::AsyncCommandGroup;
use gatekeeper_core::expression::{ExpressionContext, StatusContext};
use gatekeeper_core::workflow::StepDefinition;
use gatekeeper_core::{Error, JobResult, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// Environment variable naming the file steps append `key=value` outputs to.
pub const OUTPUT_ENV: &str = "GATEKEEPER_OUTPUT";

/// How a single step process ended.
enum StepExit {
    Exited(i32),
    Cancelled,
    TimedOut,
}

/// Per-job state shared by every step of one run.
struct JobScope<'a> {
    ctx: &'a JobContext,
    output_file: &'a Path,
    masker: Arc<ExpressionContext>,
    cancel: &'a CancelToken,
    deadline: Option<Instant>,
}

/// Shell runner for executing `run` steps on the host.
pub struct ShellRunner {
    config: RunnerConfig,
}

impl ShellRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    async fn execute_step(
        &self,
        scope: &JobScope<'_>,
        step: &StepDefinition,
        label: &str,
        expressions: &ExpressionContext,
    ) -> Result<StepExit> {
        let ctx = scope.ctx;
        let masker = &scope.masker;
        let Some(run) = step.run.as_deref() else {
            return Ok(StepExit::Exited(0));
        };
        let script = expressions.interpolate(run)?;
        let shell = step.shell.as_deref().unwrap_or(&self.config.shell);
        let workdir = match &step.working_directory {
            Some(dir) => ctx.workspace.join(expressions.interpolate(dir)?),
            None => ctx.workspace.clone(),
        };

        info!(job = %ctx.display_name, step = %label, shell, workdir = %workdir.display(), "Running step");
        debug!(script = %masker.mask_secrets(&script), "Step script");

        // Own process group, so killing the step also kills what it started.
        let mut child = Command::new(shell)
            .arg("-c")
            .arg(&script)
            .current_dir(&workdir)
            .envs(&expressions.env)
            .env(OUTPUT_ENV, scope.output_file)
            .env("GATEKEEPER_JOB", &ctx.job_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .group()
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Internal(format!("Failed to spawn '{}': {}", shell, e)))?;

        let forwarders: Vec<JoinHandle<()>> = [
            child
                .inner()
                .stdout
                .take()
                .map(|out| forward_lines(out, "stdout", label.to_string(), Arc::clone(masker))),
            child
                .inner()
                .stderr
                .take()
                .map(|err| forward_lines(err, "stderr", label.to_string(), Arc::clone(masker))),
        ]
        .into_iter()
        .flatten()
        .collect();

        let exit = tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| Error::Internal(format!("Failed to wait for step: {}", e)))?;
                StepExit::Exited(status.code().unwrap_or(-1))
            }
            _ = scope.cancel.cancelled() => {
                warn!(job = %ctx.display_name, step = %label, "Cancellation requested, killing step");
                kill_group(&mut child).await;
                StepExit::Cancelled
            }
            _ = deadline_elapsed(scope.deadline) => {
                warn!(job = %ctx.display_name, step = %label, "Job timed out, killing step");
                kill_group(&mut child).await;
                StepExit::TimedOut
            }
        };

        for handle in forwarders {
            // A process that left the group may still hold the pipes open.
            if !matches!(exit, StepExit::Exited(_)) {
                handle.abort();
            }
            let _ = handle.await;
        }
        Ok(exit)
    }
}

/// Kill every process in the step's group and reap the shell.
async fn kill_group(child: &mut command_group::AsyncGroupChild) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Process group already gone");
    }
    let _ = child.wait().await;
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

#[async_trait]
impl JobRunner for ShellRunner {
    async fn run(&self, ctx: &JobContext, cancel: CancelToken) -> Result<JobOutcome> {
        let started = Instant::now();

        if let Some(uses) = &ctx.definition.uses {
            warn!(job = %ctx.display_name, uses = %uses, "Reusable workflows cannot run on the host");
            return Ok(JobOutcome::new(JobResult::Failure).with_diagnostic(format!(
                "reusable workflow '{}' cannot be executed by the shell runner",
                uses
            )));
        }

        let output_file = tempfile::NamedTempFile::new()?;
        let deadline = ctx
            .timeout
            .or(self.config.default_timeout)
            .map(|limit| started + limit);
        let scope = JobScope {
            ctx,
            output_file: output_file.path(),
            masker: Arc::new(ctx.expressions.clone()),
            cancel: &cancel,
            deadline,
        };

        let mut outcome = JobOutcome::new(JobResult::Success);
        let mut failed = false;

        for (idx, step) in ctx.definition.steps.iter().enumerate() {
            let label = step.label(idx);

            let mut expressions = ctx.expressions.clone();
            expressions.status = StatusContext {
                upstream_succeeded: !failed,
                upstream_failed: failed,
                cancelled: cancel.is_cancelled(),
            };

            if !expressions.evaluate_condition(step.condition.as_deref())? {
                debug!(job = %ctx.display_name, step = %label, "Step condition false, skipping");
                continue;
            }

            if let Some(uses) = &step.uses {
                warn!(job = %ctx.display_name, step = %label, uses = %uses, "Action steps are not supported on the host, skipping");
                continue;
            }

            for (key, value) in &step.env {
                let value = expressions.interpolate(value)?;
                expressions.env.insert(key.clone(), value);
            }

            let exit = self.execute_step(&scope, step, &label, &expressions).await?;

            match exit {
                StepExit::Exited(0) => {}
                StepExit::Exited(code) if step.continue_on_error => {
                    warn!(job = %ctx.display_name, step = %label, exit_code = code, "Step failed, continuing");
                }
                StepExit::Exited(code) => {
                    warn!(job = %ctx.display_name, step = %label, exit_code = code, "Step failed");
                    if !failed {
                        outcome.exit_code = Some(code);
                        outcome.diagnostic =
                            Some(format!("step '{}' exited with code {}", label, code));
                    }
                    failed = true;
                }
                StepExit::Cancelled => return Ok(JobOutcome::cancelled()),
                StepExit::TimedOut => {
                    let limit = deadline.map(|d| d - started).unwrap_or_default();
                    return Ok(JobOutcome::new(JobResult::Failure).with_diagnostic(format!(
                        "timed out after {}s in step '{}'",
                        limit.as_secs(),
                        label
                    )));
                }
            }
        }

        outcome.outputs = read_outputs(output_file.path()).await?;
        outcome.result = if failed {
            JobResult::Failure
        } else if cancel.is_cancelled() {
            outcome.diagnostic = Some("cancelled before completion".to_string());
            JobResult::Cancelled
        } else {
            outcome.exit_code = Some(0);
            JobResult::Success
        };

        info!(
            job = %ctx.display_name,
            result = %outcome.result,
            duration_ms = started.elapsed().as_millis() as u64,
            "Job finished"
        );
        Ok(outcome)
    }
}

fn forward_lines<R>(
    reader: R,
    stream: &'static str,
    step: String,
    masker: Arc<ExpressionContext>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(step = %step, stream, "{}", masker.mask_secrets(&line));
        }
    })
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Parse `key=value` lines; later lines override earlier ones.
async fn read_outputs(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::cancel_pair;
    use gatekeeper_core::workflow::JobDefinition;
    use tokio::time::Duration;

    fn context(yaml: &str, workspace: &Path) -> JobContext {
        let definition: JobDefinition = serde_yaml::from_str(yaml).unwrap();
        JobContext {
            job_id: "integration-tests".to_string(),
            display_name: "integration-tests".to_string(),
            definition,
            expressions: ExpressionContext::new(),
            workspace: workspace.to_path_buf(),
            timeout: None,
        }
    }

    #[tokio::test]
    async fn test_shell_runner_success_with_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(
            r#"
steps:
  - run: echo "charm=wordpress.charm" >> "$GATEKEEPER_OUTPUT"
  - run: echo "units=${{ matrix.units }}" >> "$GATEKEEPER_OUTPUT"
"#,
            dir.path(),
        );
        ctx.expressions.matrix.insert("units".into(), serde_json::json!(3));

        let outcome = ShellRunner::default().run(&ctx, CancelToken::never()).await.unwrap();
        assert_eq!(outcome.result, JobResult::Success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.outputs["charm"], "wordpress.charm");
        assert_eq!(outcome.outputs["units"], "3");
    }

    #[tokio::test]
    async fn test_shell_runner_failure_reports_step() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            r#"
steps:
  - name: lint
    run: exit 3
  - name: never
    run: echo "ran=yes" >> "$GATEKEEPER_OUTPUT"
"#,
            dir.path(),
        );

        let outcome = ShellRunner::default().run(&ctx, CancelToken::never()).await.unwrap();
        assert_eq!(outcome.result, JobResult::Failure);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.diagnostic.as_deref(), Some("step 'lint' exited with code 3"));
        assert!(!outcome.outputs.contains_key("ran"));
    }

    #[tokio::test]
    async fn test_always_step_runs_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            r#"
steps:
  - run: "false"
  - if: always()
    run: echo "cleanup=done" >> "$GATEKEEPER_OUTPUT"
  - if: failure()
    run: echo "reported=yes" >> "$GATEKEEPER_OUTPUT"
"#,
            dir.path(),
        );

        let outcome = ShellRunner::default().run(&ctx, CancelToken::never()).await.unwrap();
        assert_eq!(outcome.result, JobResult::Failure);
        assert_eq!(outcome.outputs["cleanup"], "done");
        assert_eq!(outcome.outputs["reported"], "yes");
    }

    #[tokio::test]
    async fn test_continue_on_error_step() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            r#"
steps:
  - run: exit 1
    continue-on-error: true
  - run: echo "after=yes" >> "$GATEKEEPER_OUTPUT"
"#,
            dir.path(),
        );

        let outcome = ShellRunner::default().run(&ctx, CancelToken::never()).await.unwrap();
        assert_eq!(outcome.result, JobResult::Success);
        assert_eq!(outcome.outputs["after"], "yes");
    }

    #[tokio::test]
    async fn test_env_layering_and_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("tests")).unwrap();
        let mut ctx = context(
            r#"
steps:
  - working-directory: tests
    env:
      STEP_VALUE: step-${{ inputs.runner-image }}
      SHARED: from-step
    run: |
      echo "job=$JOB_VALUE" >> "$GATEKEEPER_OUTPUT"
      echo "step=$STEP_VALUE" >> "$GATEKEEPER_OUTPUT"
      echo "shared=$SHARED" >> "$GATEKEEPER_OUTPUT"
      echo "dir=$(basename "$PWD")" >> "$GATEKEEPER_OUTPUT"
"#,
            dir.path(),
        );
        ctx.expressions.env.insert("JOB_VALUE".into(), "from-job".into());
        ctx.expressions.env.insert("SHARED".into(), "from-job".into());
        ctx.expressions
            .inputs
            .insert("runner-image".into(), serde_json::json!("ubuntu-22.04"));

        let outcome = ShellRunner::default().run(&ctx, CancelToken::never()).await.unwrap();
        assert_eq!(outcome.result, JobResult::Success);
        assert_eq!(outcome.outputs["job"], "from-job");
        assert_eq!(outcome.outputs["step"], "step-ubuntu-22.04");
        assert_eq!(outcome.outputs["shared"], "from-step");
        assert_eq!(outcome.outputs["dir"], "tests");
    }

    #[tokio::test]
    async fn test_cancel_kills_running_step() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context("steps:\n  - run: sleep 30\n", dir.path());
        let (handle, token) = cancel_pair();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = ShellRunner::default().run(&ctx, token).await.unwrap();
        canceller.await.unwrap();

        assert_eq!(outcome.result, JobResult::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_timeout_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context("steps:\n  - name: slow\n    run: sleep 30\n", dir.path());
        ctx.timeout = Some(Duration::from_millis(100));

        let outcome = ShellRunner::default().run(&ctx, CancelToken::never()).await.unwrap();
        assert_eq!(outcome.result, JobResult::Failure);
        assert!(outcome.diagnostic.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancel_kills_processes_started_by_step() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context("steps:\n  - run: sleep 6; echo done > after.txt\n", dir.path());
        let (handle, token) = cancel_pair();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            handle.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = ShellRunner::default().run(&ctx, token).await.unwrap();
        canceller.await.unwrap();

        assert_eq!(outcome.result, JobResult::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!dir.path().join("after.txt").exists());
    }

    #[tokio::test]
    async fn test_timeout_kills_processes_started_by_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context("steps:\n  - run: sleep 6; echo done\n", dir.path());
        ctx.timeout = Some(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let outcome = ShellRunner::default().run(&ctx, CancelToken::never()).await.unwrap();

        assert_eq!(outcome.result, JobResult::Failure);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_reusable_workflow_job_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            "uses: canonical/operator-workflows/.github/workflows/integration_test.yaml@main\n",
            dir.path(),
        );

        let outcome = ShellRunner::default().run(&ctx, CancelToken::never()).await.unwrap();
        assert_eq!(outcome.result, JobResult::Failure);
        assert!(outcome.diagnostic.unwrap().contains("reusable workflow"));
    }

    #[tokio::test]
    async fn test_action_steps_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(
            r#"
steps:
  - uses: actions/checkout@v4
  - run: echo "ok=1" >> "$GATEKEEPER_OUTPUT"
"#,
            dir.path(),
        );

        let outcome = ShellRunner::default().run(&ctx, CancelToken::never()).await.unwrap();
        assert_eq!(outcome.result, JobResult::Success);
        assert_eq!(outcome.outputs["ok"], "1");
    }

    #[tokio::test]
    async fn test_read_outputs_ignores_malformed_lines() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "a=1\nnot an output\n=x\nb=two=parts\na=2\n").unwrap();
        let outputs = read_outputs(file.path()).await.unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs["a"], "2");
        assert_eq!(outputs["b"], "two=parts");
    }
}
