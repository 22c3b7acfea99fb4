//! Local workflow executor.
//!
//! Runs job groups in `needs` order on a [`JobRunner`]:
//! - independent groups and matrix variants run as concurrent tasks
//! - `fail-fast` cancels the remaining variants of a group
//! - `max-parallel` bounds running variants per group
//! - run cancellation stops running variants; pending jobs still evaluate
//!   their `if:` so `always()` jobs run

use crate::dag::{DagBuilder, DagError, WorkflowDag};
use crate::matrix::{MatrixExpander, MatrixExpansion, MatrixJob};
use chrono::Utc;
use gatekeeper_core::JobResult;
use gatekeeper_core::expression::{ExpressionContext, ExpressionError, NeedContext, StatusContext};
use gatekeeper_core::gate::Gate;
use gatekeeper_core::ids::RunId;
use gatekeeper_core::inputs::{self, InputError, InputValues};
use gatekeeper_core::run::{GroupRecord, JobRecord, RunReport};
use gatekeeper_core::workflow::{
    JobDefinition, SecretsForwarding, TriggerEvent, WorkflowDefinition,
};
use gatekeeper_runner::{CancelToken, JobContext, JobOutcome, JobRunner, cancel_pair};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Workflow(#[from] gatekeeper_core::Error),
    #[error(transparent)]
    Dag(#[from] DagError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("Workflow '{workflow}' is not triggered by {event}")]
    NotTriggered {
        workflow: String,
        event: TriggerEvent,
    },
    #[error("Gate job '{0}' is not defined in the workflow")]
    UnknownGateJob(String),
}

/// Local executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub workspace: PathBuf,
    pub event: TriggerEvent,
    pub ref_name: Option<String>,
    /// Raw `name=value` inputs, typed against the workflow's declarations.
    pub inputs: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, String>,
    /// Job whose `needs` the run's gate verdict is computed over.
    pub gate_job: Option<String>,
    /// Upper bound on running variants across the whole run.
    pub max_parallel: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            event: TriggerEvent::PullRequest,
            ref_name: None,
            inputs: BTreeMap::new(),
            secrets: BTreeMap::new(),
            gate_job: None,
            max_parallel: None,
        }
    }
}

impl ExecutorConfig {
    /// Resolve inputs and build the expression context every job starts from.
    pub fn expression_context(
        &self,
        workflow: &WorkflowDefinition,
        run_id: RunId,
    ) -> Result<ExpressionContext, ExecutorError> {
        let inputs = InputValues::resolve(&workflow.declared_inputs(), &self.inputs)?;
        if self.event == TriggerEvent::WorkflowCall {
            inputs::check_secrets(&workflow.declared_secrets(), &self.secrets)?;
        }

        let mut ctx = ExpressionContext::new();
        ctx.inputs = inputs.as_map().clone();
        ctx.secrets = self.secrets.clone();
        ctx.github = [
            ("event_name", json!(self.event.as_str())),
            ("ref_name", json!(self.ref_name.clone().unwrap_or_default())),
            ("workflow", json!(workflow.name)),
            ("run_id", json!(run_id.to_string())),
            ("workspace", json!(self.workspace.display().to_string())),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        for (key, value) in &workflow.env {
            let value = ctx
                .interpolate(value)
                .map_err(gatekeeper_core::Error::from)?;
            ctx.env.insert(key.clone(), value);
        }

        Ok(ctx)
    }
}

/// Executes workflows on the host through a [`JobRunner`].
pub struct WorkflowExecutor {
    runner: Arc<dyn JobRunner>,
    config: ExecutorConfig,
    dag_builder: DagBuilder,
    matrix_expander: MatrixExpander,
}

/// Groups decided so far, in decision order.
#[derive(Default)]
struct RunState {
    groups: BTreeMap<String, GroupRecord>,
    order: Vec<String>,
}

impl RunState {
    fn decide(&mut self, record: GroupRecord) {
        debug!(job = %record.job, result = %record.result, "Job group decided");
        self.order.push(record.job.clone());
        self.groups.insert(record.job.clone(), record);
    }

    fn decided(&self) -> BTreeSet<String> {
        self.groups.keys().cloned().collect()
    }

    fn into_groups(mut self) -> Vec<GroupRecord> {
        self.order
            .iter()
            .filter_map(|job| self.groups.remove(job))
            .collect()
    }
}

enum GroupStart {
    Decided(GroupRecord),
    Run(GroupRun),
}

impl WorkflowExecutor {
    pub fn new(runner: Arc<dyn JobRunner>, config: ExecutorConfig) -> Self {
        Self {
            runner,
            config,
            dag_builder: DagBuilder::new(),
            matrix_expander: MatrixExpander::new(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `workflow` to completion. Job failures are reported in the
    /// returned [`RunReport`]; errors are reserved for workflows that cannot
    /// start.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        cancel: CancelToken,
    ) -> Result<RunReport, ExecutorError> {
        workflow.validate()?;
        let dag = self.dag_builder.build(workflow)?;

        if !workflow
            .triggers
            .allows(self.config.event, self.config.ref_name.as_deref())
        {
            return Err(ExecutorError::NotTriggered {
                workflow: workflow.name.clone(),
                event: self.config.event,
            });
        }
        if let Some(gate_job) = &self.config.gate_job
            && !workflow.jobs.contains_key(gate_job)
        {
            return Err(ExecutorError::UnknownGateJob(gate_job.clone()));
        }

        let run_id = RunId::new();
        let started_at = Utc::now();
        let clock = Instant::now();
        let base = self.config.expression_context(workflow, run_id)?;
        let global = self
            .config
            .max_parallel
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        info!(
            run_id = %run_id,
            workflow = %workflow.name,
            event = %self.config.event,
            jobs = workflow.jobs.len(),
            "Starting workflow run"
        );

        let order: Vec<String> = dag
            .topological_order()?
            .into_iter()
            .map(|node| node.name.clone())
            .collect();

        let mut state = RunState::default();
        let mut running: HashMap<tokio::task::Id, String> = HashMap::new();
        let mut join_set = JoinSet::new();

        loop {
            for job_id in &order {
                if state.groups.contains_key(job_id) || running.values().any(|r| r == job_id) {
                    continue;
                }
                if !dag.is_ready(job_id, &state.decided()) {
                    continue;
                }

                match self.prepare_group(&dag, job_id, &base, &state, &cancel, &global) {
                    GroupStart::Decided(record) => state.decide(record),
                    GroupStart::Run(group) => {
                        let handle = join_set.spawn(group.run());
                        running.insert(handle.id(), job_id.clone());
                    }
                }
            }

            match join_set.join_next_with_id().await {
                Some(Ok((id, record))) => {
                    running.remove(&id);
                    state.decide(record);
                }
                Some(Err(err)) => {
                    let job = running.remove(&err.id()).unwrap_or_default();
                    error!(job = %job, error = %err, "Job group task failed");
                    state.decide(GroupRecord::not_run(
                        job.clone(),
                        job,
                        JobResult::Failure,
                        format!("job task failed: {}", err),
                    ));
                }
                None => break,
            }
        }

        let gate = match &self.config.gate_job {
            Some(gate_job) => {
                let needs = &workflow.job(gate_job)?.needs;
                let results: BTreeMap<String, JobResult> = needs
                    .iter()
                    .filter_map(|need| state.groups.get(need).map(|g| (need.clone(), g.result)))
                    .collect();
                let verdict = Gate::requiring(needs.iter().cloned()).evaluate_results(&results);
                for diagnostic in verdict.diagnostics() {
                    warn!(gate = %gate_job, "{}", diagnostic);
                }
                Some(verdict)
            }
            None => None,
        };

        let report = RunReport {
            id: run_id,
            workflow: workflow.name.clone(),
            event: self.config.event,
            cancelled: cancel.is_cancelled(),
            started_at,
            completed_at: Utc::now(),
            duration_ms: clock.elapsed().as_millis() as u64,
            groups: state.into_groups(),
            gate,
        };

        info!(
            run_id = %run_id,
            success = report.success(),
            duration_ms = report.duration_ms,
            "Workflow run finished"
        );
        Ok(report)
    }

    /// Evaluate a ready job's condition and matrix; either decide it
    /// immediately or hand back a group to spawn.
    fn prepare_group(
        &self,
        dag: &WorkflowDag,
        job_id: &str,
        base: &ExpressionContext,
        state: &RunState,
        cancel: &CancelToken,
        global: &Option<Arc<Semaphore>>,
    ) -> GroupStart {
        let Some(node) = dag.node(job_id) else {
            return GroupStart::Decided(GroupRecord::not_run(
                job_id,
                job_id,
                JobResult::Failure,
                "job missing from graph",
            ));
        };
        let definition = &node.definition;
        let display_name = definition.display_name(job_id).to_string();
        let not_run = |result: JobResult, reason: String| {
            info!(job = %job_id, result = %result, reason = %reason, "Job not run");
            GroupStart::Decided(GroupRecord::not_run(job_id, &display_name, result, reason))
        };

        let mut ctx = base.clone();
        ctx.needs = definition
            .needs
            .iter()
            .filter_map(|need| {
                state.groups.get(need).map(|group| {
                    let context = NeedContext {
                        result: group.result,
                        outputs: group.outputs(),
                    };
                    (need.clone(), context)
                })
            })
            .collect();
        ctx.status = StatusContext {
            upstream_succeeded: ctx.needs.values().all(|need| need.result.is_success()),
            upstream_failed: dag.ancestors(job_id).iter().any(|ancestor| {
                state
                    .groups
                    .get(ancestor)
                    .is_some_and(|g| g.result == JobResult::Failure)
            }),
            cancelled: cancel.is_cancelled(),
        };

        match ctx.evaluate_condition(definition.condition.as_deref()) {
            Ok(true) => {}
            Ok(false) if ctx.status.cancelled => {
                return not_run(JobResult::Cancelled, "run was cancelled".to_string());
            }
            Ok(false) if !ctx.status.upstream_succeeded && definition.condition.is_none() => {
                return not_run(JobResult::Skipped, "a needed job did not succeed".to_string());
            }
            Ok(false) => {
                return not_run(JobResult::Skipped, "condition evaluated to false".to_string());
            }
            Err(e) => return not_run(JobResult::Failure, format!("invalid condition: {}", e)),
        }

        let expansion = match self.matrix_expander.expand(job_id, definition, &ctx) {
            Ok(expansion) => expansion,
            Err(e) => return not_run(JobResult::Failure, e.to_string()),
        };
        if expansion.jobs.is_empty() {
            return not_run(JobResult::Skipped, "matrix expanded to no variants".to_string());
        }

        // Jobs that opt into running after cancellation must not inherit it.
        let run_cancel = if ctx.status.cancelled {
            CancelToken::never()
        } else {
            cancel.clone()
        };

        info!(job = %job_id, variants = expansion.jobs.len(), "Starting job group");
        GroupStart::Run(GroupRun {
            shared: Arc::new(VariantShared {
                runner: Arc::clone(&self.runner),
                job_id: job_id.to_string(),
                definition: definition.clone(),
                ctx,
                workspace: self.config.workspace.clone(),
            }),
            display_name,
            expansion,
            run_cancel,
            global: global.clone(),
        })
    }
}

/// One job group ready to run.
struct GroupRun {
    shared: Arc<VariantShared>,
    display_name: String,
    expansion: MatrixExpansion,
    run_cancel: CancelToken,
    global: Option<Arc<Semaphore>>,
}

/// State every variant of a group reads.
struct VariantShared {
    runner: Arc<dyn JobRunner>,
    job_id: String,
    definition: JobDefinition,
    ctx: ExpressionContext,
    workspace: PathBuf,
}

struct Permits {
    _group: OwnedSemaphorePermit,
    _global: Option<OwnedSemaphorePermit>,
}

impl GroupRun {
    async fn run(self) -> GroupRecord {
        let GroupRun {
            shared,
            display_name,
            expansion,
            run_cancel,
            global,
        } = self;
        let MatrixExpansion {
            jobs,
            fail_fast,
            max_parallel,
            ..
        } = expansion;

        let (group_handle, group_token) = cancel_pair();
        let cancel = group_token.union(&run_cancel);
        let limit = max_parallel.map_or(jobs.len(), |n| n as usize).max(1);
        let permits = Arc::new(Semaphore::new(limit));

        let mut pending = HashMap::new();
        let mut variants = JoinSet::new();
        for job in jobs {
            let handle = variants.spawn(run_variant(
                Arc::clone(&shared),
                job.clone(),
                Arc::clone(&permits),
                global.clone(),
                cancel.clone(),
            ));
            pending.insert(handle.id(), job);
        }

        let mut records = Vec::new();
        while let Some(joined) = variants.join_next_with_id().await {
            let record = match joined {
                Ok((id, record)) => {
                    pending.remove(&id);
                    record
                }
                Err(err) => {
                    error!(job = %shared.job_id, error = %err, "Variant task failed");
                    let Some(job) = pending.remove(&err.id()) else {
                        continue;
                    };
                    let mut record = new_record(&shared, &job);
                    record.result = JobResult::Failure;
                    record.diagnostic = Some(format!("variant task failed: {}", err));
                    record
                }
            };

            if fail_fast
                && record.result == JobResult::Failure
                && !record.continue_on_error
                && !group_handle.is_cancelled()
            {
                warn!(
                    job = %shared.job_id,
                    variant = %record.display_name,
                    "Variant failed, cancelling remaining variants"
                );
                group_handle.cancel();
            }
            records.push(record);
        }

        records.sort_by_key(|record| record.index);
        GroupRecord::from_variants(shared.job_id.clone(), display_name, records)
    }
}

fn new_record(shared: &VariantShared, job: &MatrixJob) -> JobRecord {
    JobRecord {
        id: job.id,
        job: shared.job_id.clone(),
        display_name: job.display_name.clone(),
        index: job.index,
        matrix: job.values.clone(),
        result: JobResult::Cancelled,
        continue_on_error: shared.definition.continue_on_error,
        started_at: None,
        completed_at: None,
        duration_ms: None,
        exit_code: None,
        diagnostic: None,
        outputs: BTreeMap::new(),
    }
}

async fn run_variant(
    shared: Arc<VariantShared>,
    job: MatrixJob,
    permits: Arc<Semaphore>,
    global: Option<Arc<Semaphore>>,
    cancel: CancelToken,
) -> JobRecord {
    let mut record = new_record(&shared, &job);

    let acquired = if cancel.is_cancelled() {
        None
    } else {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            acquired = acquire(permits, global) => acquired,
        }
    };
    let Some(_permits) = acquired else {
        info!(job = %record.display_name, "Job cancelled before start");
        record.diagnostic = Some("cancelled before start".to_string());
        return record;
    };

    let ctx = match job_context(&shared, &job) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!(job = %record.display_name, error = %e, "Could not prepare job");
            record.result = JobResult::Failure;
            record.diagnostic = Some(e.to_string());
            return record;
        }
    };

    info!(job = %record.display_name, "Starting job");
    let clock = Instant::now();
    record.started_at = Some(Utc::now());

    let outcome = match shared.runner.run(&ctx, cancel).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(job = %record.display_name, error = %e, "Runner error");
            JobOutcome::new(JobResult::Failure).with_diagnostic(e.to_string())
        }
    };

    record.completed_at = Some(Utc::now());
    record.duration_ms = Some(clock.elapsed().as_millis() as u64);
    record.result = outcome.result;
    record.exit_code = outcome.exit_code;
    record.diagnostic = outcome.diagnostic;
    record.outputs = outcome.outputs;

    info!(
        job = %record.display_name,
        result = %record.result,
        duration_ms = record.duration_ms.unwrap_or_default(),
        "Job finished"
    );
    record
}

async fn acquire(group: Arc<Semaphore>, global: Option<Arc<Semaphore>>) -> Option<Permits> {
    let group = group.acquire_owned().await.ok()?;
    let global = match global {
        Some(global) => Some(global.acquire_owned().await.ok()?),
        None => None,
    };
    Some(Permits {
        _group: group,
        _global: global,
    })
}

fn job_context(
    shared: &VariantShared,
    job: &MatrixJob,
) -> Result<JobContext, gatekeeper_core::Error> {
    let definition = &shared.definition;
    let mut expressions = shared.ctx.clone();
    expressions.matrix = job.values.clone();

    for (key, value) in &definition.env {
        let value = expressions.interpolate(value)?;
        expressions.env.insert(key.clone(), value);
    }
    expressions.secrets = forwarded_secrets(definition, &expressions)?;

    Ok(JobContext {
        job_id: shared.job_id.clone(),
        display_name: job.display_name.clone(),
        definition: definition.clone(),
        expressions,
        workspace: shared.workspace.clone(),
        timeout: definition
            .timeout_minutes
            .map(|minutes| Duration::from_secs(u64::from(minutes) * 60)),
    })
}

/// Secrets visible to a job. Step jobs see every run secret; reusable
/// workflow jobs see only what `secrets:` forwards.
pub fn forwarded_secrets(
    definition: &JobDefinition,
    ctx: &ExpressionContext,
) -> Result<BTreeMap<String, String>, ExpressionError> {
    if definition.uses.is_none() {
        return Ok(ctx.secrets.clone());
    }

    match &definition.secrets {
        None => Ok(BTreeMap::new()),
        Some(SecretsForwarding::Keyword(_)) => Ok(ctx.secrets.clone()),
        Some(SecretsForwarding::Explicit(mapping)) => mapping
            .iter()
            .map(|(name, value)| Ok((name.clone(), ctx.interpolate(value)?)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_runner::{ScriptedOutcomes, ScriptedRunner};
    use pretty_assertions::assert_eq;

    const WORKFLOW: &str = r#"
name: Tests
on:
  pull_request:
  workflow_call:
    inputs:
      images:
        type: string
        required: true
    secrets:
      OPENSTACK_RC:
        required: true
jobs:
  integration-tests:
    strategy:
      matrix:
        image: ${{ fromJSON(inputs.images) }}
    steps:
      - run: tox -e integration -- --image ${{ matrix.image }}
  unit-tests:
    steps:
      - run: tox -e unit
  required-checks:
    needs: [integration-tests, unit-tests]
    if: always()
    steps:
      - run: echo done
"#;

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            workspace: PathBuf::from("."),
            inputs: [("images".to_string(), r#"["a", "b"]"#.to_string())].into(),
            gate_job: Some("required-checks".to_string()),
            ..Default::default()
        }
    }

    fn executor(outcomes: ScriptedOutcomes, config: ExecutorConfig) -> WorkflowExecutor {
        WorkflowExecutor::new(Arc::new(ScriptedRunner::new(outcomes)), config)
    }

    #[tokio::test]
    async fn test_all_success_passes_gate() {
        let wf = WorkflowDefinition::from_yaml(WORKFLOW).unwrap();
        let report = executor(ScriptedOutcomes::default(), config())
            .execute(&wf, CancelToken::never())
            .await
            .unwrap();

        assert_eq!(report.result_of("integration-tests"), Some(JobResult::Success));
        assert_eq!(report.group("integration-tests").unwrap().variants.len(), 2);
        assert_eq!(report.result_of("required-checks"), Some(JobResult::Success));
        assert_eq!(report.groups.last().unwrap().job, "required-checks");
        assert!(report.gate.as_ref().unwrap().passed());
        assert!(report.success());
    }

    #[tokio::test]
    async fn test_failed_variant_fails_gate_but_gate_job_runs() {
        let wf = WorkflowDefinition::from_yaml(WORKFLOW).unwrap();
        let outcomes = ScriptedOutcomes::default()
            .with("integration-tests (image=b)", JobResult::Failure);
        let report = executor(outcomes, config())
            .execute(&wf, CancelToken::never())
            .await
            .unwrap();

        assert_eq!(report.result_of("integration-tests"), Some(JobResult::Failure));
        assert_eq!(report.result_of("required-checks"), Some(JobResult::Success));
        let verdict = report.gate.unwrap();
        assert!(!verdict.passed());
        assert_eq!(verdict.failures().next().unwrap().dependency, "integration-tests");
    }

    #[tokio::test]
    async fn test_dependent_without_always_is_skipped() {
        let wf = WorkflowDefinition::from_yaml(
            r#"
name: chain
on: push
jobs:
  build:
    steps:
      - run: make
  test:
    needs: build
    steps:
      - run: make test
  report:
    needs: test
    if: failure()
    steps:
      - run: echo report
"#,
        )
        .unwrap();
        let cfg = ExecutorConfig {
            event: TriggerEvent::Push,
            ..Default::default()
        };
        let report = executor(ScriptedOutcomes::default().with("build", JobResult::Failure), cfg)
            .execute(&wf, CancelToken::never())
            .await
            .unwrap();

        assert_eq!(report.result_of("test"), Some(JobResult::Skipped));
        assert_eq!(
            report.group("test").unwrap().reason.as_deref(),
            Some("a needed job did not succeed")
        );
        assert_eq!(report.result_of("report"), Some(JobResult::Success));
        assert!(!report.success());
    }

    #[tokio::test]
    async fn test_rejects_untriggered_event_and_unknown_gate() {
        let wf = WorkflowDefinition::from_yaml(WORKFLOW).unwrap();

        let push = ExecutorConfig {
            event: TriggerEvent::Push,
            ..config()
        };
        let err = executor(ScriptedOutcomes::default(), push)
            .execute(&wf, CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::NotTriggered { .. }));

        let bad_gate = ExecutorConfig {
            gate_job: Some("nope".to_string()),
            ..config()
        };
        let err = executor(ScriptedOutcomes::default(), bad_gate)
            .execute(&wf, CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::UnknownGateJob(_)));
    }

    #[tokio::test]
    async fn test_missing_inputs_and_secrets() {
        let wf = WorkflowDefinition::from_yaml(WORKFLOW).unwrap();

        let no_images = ExecutorConfig {
            inputs: BTreeMap::new(),
            ..config()
        };
        let err = executor(ScriptedOutcomes::default(), no_images)
            .execute(&wf, CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Input(InputError::MissingRequired(_))));

        let call = ExecutorConfig {
            event: TriggerEvent::WorkflowCall,
            ..config()
        };
        let err = executor(ScriptedOutcomes::default(), call)
            .execute(&wf, CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Input(InputError::MissingSecret(_))));
    }

    #[test]
    fn test_forwarded_secrets() {
        let mut ctx = ExpressionContext::new();
        ctx.secrets.insert("OPENSTACK_RC".into(), "rc-value".into());
        ctx.secrets.insert("OTHER".into(), "other".into());

        let steps: JobDefinition = serde_yaml::from_str("steps:\n  - run: x\n").unwrap();
        assert_eq!(forwarded_secrets(&steps, &ctx).unwrap().len(), 2);

        let bare: JobDefinition = serde_yaml::from_str("uses: o/r/w.yaml@main\n").unwrap();
        assert!(forwarded_secrets(&bare, &ctx).unwrap().is_empty());

        let inherit: JobDefinition =
            serde_yaml::from_str("uses: o/r/w.yaml@main\nsecrets: inherit\n").unwrap();
        assert_eq!(forwarded_secrets(&inherit, &ctx).unwrap().len(), 2);

        let explicit: JobDefinition = serde_yaml::from_str(
            "uses: o/r/w.yaml@main\nsecrets:\n  RC: ${{ secrets.OPENSTACK_RC }}\n",
        )
        .unwrap();
        let forwarded = forwarded_secrets(&explicit, &ctx).unwrap();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded["RC"], "rc-value");
    }

    #[test]
    fn test_expression_context_github_values() {
        let wf = WorkflowDefinition::from_yaml(WORKFLOW).unwrap();
        let cfg = ExecutorConfig {
            ref_name: Some("main".to_string()),
            ..config()
        };
        let ctx = cfg.expression_context(&wf, RunId::new()).unwrap();
        assert_eq!(ctx.github["event_name"], json!("pull_request"));
        assert_eq!(ctx.github["ref_name"], json!("main"));
        assert_eq!(ctx.inputs["images"], json!(r#"["a", "b"]"#));
    }
}
