//! Workflow definition types.
//!
//! These types represent the user-authored workflow YAML: triggers,
//! declared inputs and secrets, and the jobs with their `needs` edges,
//! matrices and steps.

use crate::error::{Error, Result};
use crate::expression::{self, stringify};
use crate::inputs::{InputDeclaration, SecretDeclaration};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(rename = "on", default)]
    #[schemars(with = "BTreeMap<String, TriggerSpec>")]
    pub triggers: Triggers,
    #[serde(default, deserialize_with = "scalar_map")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub concurrency: Option<Concurrency>,
    pub jobs: BTreeMap<String, JobDefinition>,
}

impl WorkflowDefinition {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn job(&self, job_id: &str) -> Result<&JobDefinition> {
        self.jobs
            .get(job_id)
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
    }

    /// Inputs declared by `workflow_call` and `workflow_dispatch`.
    pub fn declared_inputs(&self) -> BTreeMap<String, InputDeclaration> {
        [TriggerEvent::WorkflowDispatch, TriggerEvent::WorkflowCall]
            .iter()
            .filter_map(|event| self.triggers.spec(*event))
            .flat_map(|spec| spec.inputs.clone())
            .collect()
    }

    /// Secrets declared by `workflow_call`.
    pub fn declared_secrets(&self) -> BTreeMap<String, SecretDeclaration> {
        self.triggers
            .spec(TriggerEvent::WorkflowCall)
            .map(|spec| spec.secrets.clone())
            .unwrap_or_default()
    }

    /// Structural checks that do not need the job graph.
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(Error::WorkflowValidation("workflow has no jobs".to_string()));
        }

        for (job_id, job) in &self.jobs {
            let invalid = |msg: String| Error::WorkflowValidation(format!("job '{}': {}", job_id, msg));

            match (&job.uses, job.steps.is_empty()) {
                (Some(_), false) => {
                    return Err(invalid("cannot declare both 'uses' and 'steps'".to_string()));
                }
                (None, true) => return Err(invalid("declares neither 'uses' nor 'steps'".to_string())),
                _ => {}
            }

            if let Some(condition) = &job.condition {
                expression::check_condition(condition).map_err(|e| invalid(e.to_string()))?;
            }

            if let Some(name) = &job.name {
                expression::check_templates(name).map_err(|e| invalid(e.to_string()))?;
            }

            for (idx, step) in job.steps.iter().enumerate() {
                let label = step.label(idx);
                let invalid_step =
                    |msg: String| invalid(format!("step '{}': {}", label, msg));

                if step.run.is_none() && step.uses.is_none() {
                    return Err(invalid_step("declares neither 'run' nor 'uses'".to_string()));
                }
                if let Some(run) = &step.run {
                    expression::check_templates(run).map_err(|e| invalid_step(e.to_string()))?;
                }
                if let Some(condition) = &step.condition {
                    expression::check_condition(condition)
                        .map_err(|e| invalid_step(e.to_string()))?;
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    PullRequest,
    WorkflowDispatch,
    Push,
    WorkflowCall,
}

impl TriggerEvent {
    pub const ALL: [TriggerEvent; 4] = [
        TriggerEvent::PullRequest,
        TriggerEvent::WorkflowDispatch,
        TriggerEvent::Push,
        TriggerEvent::WorkflowCall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerEvent::PullRequest => "pull_request",
            TriggerEvent::WorkflowDispatch => "workflow_dispatch",
            TriggerEvent::Push => "push",
            TriggerEvent::WorkflowCall => "workflow_call",
        }
    }

    fn filters_branches(&self) -> bool {
        matches!(self, TriggerEvent::Push | TriggerEvent::PullRequest)
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TriggerEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| Error::NotTriggered(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct TriggerSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches_ignore: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputDeclaration>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, SecretDeclaration>,
}

/// The `on:` block. Accepts `on: push`, `on: [push, pull_request]` and the
/// map form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "RawTriggers", into = "BTreeMap<String, TriggerSpec>")]
pub struct Triggers {
    events: BTreeMap<String, TriggerSpec>,
}

impl Triggers {
    pub fn spec(&self, event: TriggerEvent) -> Option<&TriggerSpec> {
        self.events.get(event.as_str())
    }

    pub fn insert(&mut self, event: TriggerEvent, spec: TriggerSpec) {
        self.events.insert(event.as_str().to_string(), spec);
    }

    /// Names of all declared events, including ones Gatekeeper cannot run.
    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    /// Whether `event` on `branch` starts this workflow.
    ///
    /// Branch filters only apply to push and pull request events, and only
    /// when a branch is known.
    pub fn allows(&self, event: TriggerEvent, branch: Option<&str>) -> bool {
        let Some(spec) = self.spec(event) else {
            return false;
        };
        let Some(branch) = branch.filter(|_| event.filters_branches()) else {
            return true;
        };

        let included = spec.branches.is_empty() || branch_filter_matches(&spec.branches, branch);
        let ignored =
            !spec.branches_ignore.is_empty() && branch_filter_matches(&spec.branches_ignore, branch);
        included && !ignored
    }
}

impl From<Triggers> for BTreeMap<String, TriggerSpec> {
    fn from(triggers: Triggers) -> Self {
        triggers.events
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTriggers {
    One(String),
    Many(Vec<String>),
    Map(BTreeMap<String, serde_yaml::Value>),
}

impl TryFrom<RawTriggers> for Triggers {
    type Error = serde_yaml::Error;

    fn try_from(raw: RawTriggers) -> std::result::Result<Self, Self::Error> {
        let events = match raw {
            RawTriggers::One(event) => [(event, TriggerSpec::default())].into(),
            RawTriggers::Many(events) => events
                .into_iter()
                .map(|event| (event, TriggerSpec::default()))
                .collect(),
            RawTriggers::Map(map) => map
                .into_iter()
                .map(|(event, value)| {
                    // `schedule` and friends carry lists; only mappings are specs.
                    let spec = match value {
                        serde_yaml::Value::Mapping(_) => serde_yaml::from_value(value)?,
                        _ => TriggerSpec::default(),
                    };
                    Ok((event, spec))
                })
                .collect::<std::result::Result<_, serde_yaml::Error>>()?,
        };
        Ok(Self { events })
    }
}

/// Evaluate branch patterns in order; a later `!pattern` can exclude an
/// earlier match.
fn branch_filter_matches(patterns: &[String], branch: &str) -> bool {
    patterns.iter().fold(false, |matched, pattern| {
        match pattern.strip_prefix('!') {
            Some(negated) if glob_match(negated, branch) => false,
            Some(_) => matched,
            None => matched || glob_match(pattern, branch),
        }
    })
}

/// Branch glob: `**` matches anything, `*` anything but `/`, `?` one
/// character but `/`.
fn glob_match(pattern: &str, branch: &str) -> bool {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                regex.push_str(".*");
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');

    Regex::new(&regex).is_ok_and(|re| re.is_match(branch))
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct JobDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub needs: Vec<String>,
    #[serde(rename = "if", default)]
    pub condition: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub runs_on: Vec<String>,
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    /// Reusable workflow reference, e.g. `org/repo/.github/workflows/x.yaml@main`.
    #[serde(default)]
    pub uses: Option<String>,
    #[serde(default)]
    pub with: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub secrets: Option<SecretsForwarding>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl JobDefinition {
    pub fn display_name<'a>(&'a self, job_id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(job_id)
    }

    pub fn fail_fast(&self) -> bool {
        self.strategy.as_ref().is_none_or(|s| s.fail_fast)
    }

    pub fn max_parallel(&self) -> Option<u32> {
        self.strategy.as_ref().and_then(|s| s.max_parallel)
    }

    pub fn matrix(&self) -> Option<&MatrixConfig> {
        self.strategy.as_ref().and_then(|s| s.matrix.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct StrategyConfig {
    #[serde(default)]
    pub matrix: Option<MatrixConfig>,
    #[serde(default = "default_true")]
    pub fail_fast: bool,
    #[serde(default)]
    pub max_parallel: Option<u32>,
}

fn default_true() -> bool {
    true
}

/// Matrix axes plus `include`/`exclude` adjustments.
///
/// An axis is either a list of values or an expression string that
/// evaluates to a list, such as `${{ fromJSON(inputs.images) }}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MatrixConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<BTreeMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<BTreeMap<String, serde_json::Value>>,
    #[serde(flatten)]
    pub axes: BTreeMap<String, serde_json::Value>,
}

/// Secrets handed to a reusable workflow job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SecretsForwarding {
    Keyword(SecretsKeyword),
    Explicit(BTreeMap<String, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SecretsKeyword {
    Inherit,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub struct StepDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub uses: Option<String>,
    #[serde(default)]
    pub with: BTreeMap<String, serde_json::Value>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(rename = "if", default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl StepDefinition {
    /// Name used in logs: `name`, then `id`, then the step's position.
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| format!("step-{}", index + 1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Concurrency {
    Group(String),
    Config {
        group: String,
        #[serde(default, rename = "cancel-in-progress")]
        cancel_in_progress: bool,
    },
}

impl Concurrency {
    pub fn group(&self) -> &str {
        match self {
            Concurrency::Group(group) | Concurrency::Config { group, .. } => group,
        }
    }
}

// ---------------------------------------------------------------------------
// Deserialization helpers
// ---------------------------------------------------------------------------

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

/// YAML `env:` values may be numbers or booleans; keep them as text.
fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, stringify(&v)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKFLOW: &str = r#"
name: Integration tests
on:
  pull_request:
  workflow_dispatch:
  push:
    branches: [main, "track/**", "!track/legacy"]
  workflow_call:
    inputs:
      images:
        type: string
        required: true
    secrets:
      OPENSTACK_RC:
        required: true
env:
  PYTHONUNBUFFERED: 1
jobs:
  integration-tests:
    name: Integration tests
    runs-on: ubuntu-22.04
    strategy:
      fail-fast: false
      max-parallel: 2
      matrix:
        units: [1, 3]
        source: [juju-config, relation]
        exclude:
          - units: 3
            source: relation
    steps:
      - run: tox -e integration
        env:
          DEBUG: true
  required-checks:
    needs: integration-tests
    if: always()
    steps:
      - run: echo done
"#;

    #[test]
    fn test_parse_workflow() {
        let wf = WorkflowDefinition::from_yaml(WORKFLOW).unwrap();
        assert_eq!(wf.name, "Integration tests");
        assert_eq!(wf.env["PYTHONUNBUFFERED"], "1");

        let tests = wf.job("integration-tests").unwrap();
        assert_eq!(tests.display_name("integration-tests"), "Integration tests");
        assert_eq!(tests.runs_on, vec!["ubuntu-22.04"]);
        assert!(!tests.fail_fast());
        assert_eq!(tests.max_parallel(), Some(2));
        assert_eq!(tests.steps[0].env["DEBUG"], "true");

        let matrix = tests.matrix().unwrap();
        assert_eq!(matrix.axes.len(), 2);
        assert_eq!(matrix.exclude.len(), 1);

        let gate = wf.job("required-checks").unwrap();
        assert_eq!(gate.needs, vec!["integration-tests"]);
        assert_eq!(gate.condition.as_deref(), Some("always()"));
        assert!(gate.fail_fast());

        assert!(wf.validate().is_ok());
        assert!(matches!(wf.job("missing"), Err(Error::JobNotFound(_))));
    }

    #[test]
    fn test_declared_inputs_and_secrets() {
        let wf = WorkflowDefinition::from_yaml(WORKFLOW).unwrap();
        assert!(wf.declared_inputs()["images"].required);
        assert!(wf.declared_secrets().contains_key("OPENSTACK_RC"));
    }

    #[test]
    fn test_trigger_forms() {
        let one: WorkflowDefinition =
            WorkflowDefinition::from_yaml("name: a\non: push\njobs: {}\n").unwrap();
        assert!(one.triggers.allows(TriggerEvent::Push, Some("anything")));
        assert!(!one.triggers.allows(TriggerEvent::PullRequest, None));

        let many =
            WorkflowDefinition::from_yaml("name: a\non: [push, workflow_dispatch]\njobs: {}\n")
                .unwrap();
        assert!(many.triggers.allows(TriggerEvent::WorkflowDispatch, None));
    }

    #[test]
    fn test_branch_filters() {
        let wf = WorkflowDefinition::from_yaml(WORKFLOW).unwrap();
        let t = &wf.triggers;
        assert!(t.allows(TriggerEvent::Push, Some("main")));
        assert!(t.allows(TriggerEvent::Push, Some("track/2.0/stable")));
        assert!(!t.allows(TriggerEvent::Push, Some("track/legacy")));
        assert!(!t.allows(TriggerEvent::Push, Some("feature/x")));
        assert!(t.allows(TriggerEvent::PullRequest, Some("feature/x")));
        assert!(t.allows(TriggerEvent::WorkflowCall, None));
    }

    #[test]
    fn test_glob_match() {
        assert!(glob_match("release/*", "release/1.0"));
        assert!(!glob_match("release/*", "release/1.0/hotfix"));
        assert!(glob_match("release/**", "release/1.0/hotfix"));
        assert!(glob_match("v?", "v1"));
        assert!(glob_match("a.b", "a.b"));
        assert!(!glob_match("a.b", "axb"));
    }

    #[test]
    fn test_secrets_forwarding_forms() {
        let job: JobDefinition =
            serde_yaml::from_str("uses: org/repo/.github/workflows/t.yaml@main\nsecrets: inherit\n")
                .unwrap();
        assert_eq!(
            job.secrets,
            Some(SecretsForwarding::Keyword(SecretsKeyword::Inherit))
        );

        let job: JobDefinition = serde_yaml::from_str(
            "uses: org/repo/.github/workflows/t.yaml@main\nsecrets:\n  RC: ${{ secrets.OPENSTACK_RC }}\n",
        )
        .unwrap();
        assert!(matches!(job.secrets, Some(SecretsForwarding::Explicit(_))));
    }

    #[test]
    fn test_validate_rejects_bad_jobs() {
        let both = "name: a\njobs:\n  x:\n    uses: o/r/w.yaml@main\n    steps:\n      - run: echo\n";
        assert!(WorkflowDefinition::from_yaml(both).unwrap().validate().is_err());

        let neither = "name: a\njobs:\n  x:\n    runs-on: ubuntu-latest\n";
        assert!(WorkflowDefinition::from_yaml(neither).unwrap().validate().is_err());

        let bad_if = "name: a\njobs:\n  x:\n    if: success( &&\n    steps:\n      - run: echo\n";
        assert!(WorkflowDefinition::from_yaml(bad_if).unwrap().validate().is_err());

        let bad_run = "name: a\njobs:\n  x:\n    steps:\n      - run: echo ${{ matrix. }}\n";
        assert!(WorkflowDefinition::from_yaml(bad_run).unwrap().validate().is_err());

        let empty = "name: a\njobs: {}\n";
        assert!(WorkflowDefinition::from_yaml(empty).unwrap().validate().is_err());
    }

    #[test]
    fn test_concurrency_forms() {
        let wf = WorkflowDefinition::from_yaml(
            "name: a\nconcurrency:\n  group: ci-${{ github.ref_name }}\n  cancel-in-progress: true\njobs: {}\n",
        )
        .unwrap();
        assert_eq!(wf.concurrency.unwrap().group(), "ci-${{ github.ref_name }}");
    }
}
