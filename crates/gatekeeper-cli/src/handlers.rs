//! Command handlers. Each returns the process exit code.

use crate::commands::{CheckArgs, PlanArgs, RunArgs};
use crate::config::CliConfig;
use crate::output;
use console::style;
use gatekeeper_core::gate::{self, Gate};
use gatekeeper_core::workflow::{TriggerEvent, WorkflowDefinition};
use gatekeeper_runner::{
    JobRunner, RunnerConfig, ScriptedOutcomes, ScriptedRunner, ShellRunner, cancel_pair,
};
use gatekeeper_scheduler::{DagBuilder, ExecutionPlan, ExecutorConfig, WorkflowExecutor};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

type HandlerResult = Result<u8, Box<dyn std::error::Error>>;

const EXIT_OK: u8 = 0;
const EXIT_FAILED: u8 = 1;

const TEMPLATE: &str = r#"name: Integration tests

on:
  pull_request:
  workflow_dispatch:
  workflow_call:
    inputs:
      images:
        description: JSON-encoded list of images under test
        type: string
        default: '[]'
      runner-image:
        description: Image of the machine the tests run on
        type: string
        default: ubuntu-22.04
      extra-arguments:
        description: Extra arguments passed to the test runner
        type: string
        default: ''
    secrets:
      OPENSTACK_RC:
        required: false

jobs:
  integration-tests:
    name: Integration tests
    strategy:
      fail-fast: true
      matrix:
        units: [1, 3]
    steps:
      - run: echo "integration tests with ${{ matrix.units }} units ${{ inputs.extra-arguments }}"

  storage-integration-tests:
    name: Storage integration tests
    steps:
      - run: echo "storage tests against ${{ inputs.images }}"
        env:
          OPENSTACK_RC: ${{ secrets.OPENSTACK_RC }}

  required-checks:
    name: Required checks
    needs: [integration-tests, storage-integration-tests]
    if: always()
    steps:
      - run: gatekeeper check --needs '${{ toJSON(needs) }}'
"#;

/// Evaluate the aggregation gate.
pub fn check(config: &CliConfig, args: CheckArgs) -> HandlerResult {
    let mut reported = BTreeMap::new();
    if let Some(source) = &args.needs {
        reported.extend(gate::parse_needs_json(&read_source(source)?)?);
    }
    reported.extend(gate::parse_result_pairs(&args.results)?);

    if reported.is_empty() && args.required.is_empty() {
        return Err("no dependency results given; pass --needs, --result or --require".into());
    }

    let verdict = Gate::requiring(args.required).evaluate(&reported);
    info!(passed = verdict.passed(), checks = verdict.checks.len(), "Gate evaluated");

    if !output::print_structured(&verdict, args.format.unwrap_or(config.output_format))? {
        print!("{}", output::render_verdict(&verdict));
    }

    Ok(u8::try_from(verdict.exit_code()).unwrap_or(EXIT_FAILED))
}

/// Validate a workflow file.
pub fn validate(config: &CliConfig, path: Option<PathBuf>) -> HandlerResult {
    let path = path.unwrap_or_else(|| config.workflow.clone());
    let workflow = WorkflowDefinition::from_path(&path)?;
    workflow.validate()?;
    let dag = DagBuilder::new().build(&workflow)?;

    println!(
        "{} Workflow \"{}\" is valid",
        style("✓").green(),
        workflow.name
    );
    let events: Vec<&str> = workflow.triggers.event_names().collect();
    println!("  Triggers: {}", events.join(", "));
    println!("  Jobs: {}", workflow.jobs.len());

    for node in dag.topological_order()? {
        let definition = &node.definition;
        let kind = match &definition.uses {
            Some(uses) => format!("uses {}", uses),
            None => format!("{} steps", definition.steps.len()),
        };
        if definition.needs.is_empty() {
            println!("    - {} ({})", node.name, kind);
        } else {
            println!(
                "    - {} ({}, needs {})",
                node.name,
                kind,
                definition.needs.join(", ")
            );
        }
    }

    Ok(EXIT_OK)
}

/// Show the execution plan.
pub fn plan(config: &CliConfig, args: PlanArgs) -> HandlerResult {
    let path = args.path.unwrap_or_else(|| config.workflow.clone());
    let workflow = WorkflowDefinition::from_path(&path)?;
    let executor_config = ExecutorConfig {
        inputs: parse_pairs(&args.inputs, "--input")?,
        ..Default::default()
    };

    let plan = ExecutionPlan::build(&workflow, &executor_config)?;
    if !output::print_structured(&plan, args.format.unwrap_or(config.output_format))? {
        print!("{}", output::render_plan(&plan));
    }
    Ok(EXIT_OK)
}

/// Run a workflow locally.
pub async fn run(config: &CliConfig, args: RunArgs) -> HandlerResult {
    let path = args.path.clone().unwrap_or_else(|| config.workflow.clone());
    let workflow = WorkflowDefinition::from_path(&path)?;
    let executor_config = executor_config(config, &args, &workflow)?;

    let runner: Arc<dyn JobRunner> = match &args.outcomes {
        Some(outcomes) => Arc::new(ScriptedRunner::new(ScriptedOutcomes::from_path(outcomes)?)),
        None => Arc::new(ShellRunner::new(RunnerConfig {
            shell: config.shell.clone(),
            ..Default::default()
        })),
    };

    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            handle.cancel();
        }
    });

    let format = args.format.unwrap_or(config.output_format);
    info!(workflow = %workflow.name, event = %executor_config.event, "Running workflow");
    if let Some(banner) = output::run_banner(&workflow.name, executor_config.event, format) {
        println!("{}", banner);
    }

    let report = WorkflowExecutor::new(runner, executor_config)
        .execute(&workflow, token)
        .await?;

    if !output::print_structured(&report, format)? {
        print!("{}", output::render_report(&report));
    }

    Ok(if report.success() { EXIT_OK } else { EXIT_FAILED })
}

fn executor_config(
    config: &CliConfig,
    args: &RunArgs,
    workflow: &WorkflowDefinition,
) -> Result<ExecutorConfig, Box<dyn std::error::Error>> {
    let event: TriggerEvent = args.event.parse()?;

    let secrets = args
        .secrets
        .iter()
        .map(|name| {
            std::env::var(name)
                .map(|value| (name.clone(), value))
                .map_err(|_| format!("secret {} is not set in the environment", name))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    // A configured default gate only applies to workflows that define it.
    let gate_job = args.gate.clone().or_else(|| {
        config
            .gate_job
            .clone()
            .filter(|job| workflow.jobs.contains_key(job))
    });

    Ok(ExecutorConfig {
        workspace: match &args.workspace {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        },
        event,
        ref_name: args.ref_name.clone(),
        inputs: parse_pairs(&args.inputs, "--input")?,
        secrets,
        gate_job,
        max_parallel: args.max_parallel.or(config.max_parallel),
    })
}

/// Print the workflow JSON Schema.
pub fn schema() -> HandlerResult {
    let schema = schemars::schema_for!(WorkflowDefinition);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(EXIT_OK)
}

/// Write a starter workflow.
pub fn init(config: &CliConfig, path: Option<PathBuf>, force: bool) -> HandlerResult {
    let path = path.unwrap_or_else(|| config.workflow.clone());

    if path.exists() && !force {
        println!(
            "{} {} already exists (use --force to overwrite)",
            style("!").yellow(),
            path.display()
        );
        return Ok(EXIT_OK);
    }

    write_template(&path)?;
    println!("{} Created {}", style("✓").green(), path.display());
    Ok(EXIT_OK)
}

fn write_template(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, TEMPLATE)
}

/// Show configuration.
pub fn show_config(config: &CliConfig) -> HandlerResult {
    println!("Current configuration:");
    println!("  workflow: {}", config.workflow.display());
    println!(
        "  gate_job: {}",
        config.gate_job.as_deref().unwrap_or("(not set)")
    );
    println!("  output_format: {:?}", config.output_format);
    println!(
        "  max_parallel: {}",
        config
            .max_parallel
            .map_or_else(|| "(unbounded)".to_string(), |n| n.to_string())
    );
    println!("  shell: {}", config.shell);

    if let Ok(path) = CliConfig::config_path() {
        println!("\nConfig file: {}", path.display());
    }

    Ok(EXIT_OK)
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> HandlerResult {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(EXIT_OK)
}

/// Inline text, `@path` for a file, or `-` for stdin.
fn read_source(source: &str) -> std::io::Result<String> {
    if source == "-" {
        let mut content = String::new();
        std::io::stdin().read_to_string(&mut content)?;
        Ok(content)
    } else if let Some(path) = source.strip_prefix('@') {
        std::fs::read_to_string(path)
    } else {
        Ok(source.to_string())
    }
}

fn parse_pairs(pairs: &[String], flag: &str) -> Result<BTreeMap<String, String>, String> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .filter(|(name, _)| !name.trim().is_empty())
                .map(|(name, value)| (name.trim().to_string(), value.to_string()))
                .ok_or_else(|| format!("{} expects NAME=VALUE, got '{}'", flag, pair))
        })
        .collect()
}
