//! Sample workflows modelled on a charm repository's integration tests.

use gatekeeper_core::workflow::WorkflowDefinition;
use gatekeeper_scheduler::ExecutorConfig;
use std::path::PathBuf;

/// Name of the aggregation job in every fixture.
pub const GATE_JOB: &str = "required-checks";

/// Two independent test suites feeding an always-running gate job.
pub const INTEGRATION_WORKFLOW: &str = r#"
name: Integration tests
on:
  pull_request:
  workflow_dispatch:
  push:
    branches: [main, "track/**"]
  workflow_call:
    inputs:
      images:
        type: string
        default: '["wordpress:6.4"]'
      runner-image:
        type: string
        default: ubuntu-22.04
      extra-arguments:
        type: string
        default: ''
    secrets:
      OPENSTACK_RC:
        required: true
jobs:
  integration-tests:
    name: Integration tests
    strategy:
      fail-fast: true
      matrix:
        units: [1, 3]
        config: [file, relation]
    steps:
      - run: tox -e integration -- --units ${{ matrix.units }} ${{ inputs.extra-arguments }}
  storage-integration-tests:
    name: Storage integration tests
    env:
      OPENSTACK_RC: ${{ secrets.OPENSTACK_RC }}
    steps:
      - run: tox -e integration-storage
  required-checks:
    needs: [integration-tests, storage-integration-tests]
    if: always()
    steps:
      - run: gatekeeper check --needs '${{ toJSON(needs) }}'
"#;

/// A gate job missing `if: always()`; it is skipped when a dependency fails.
pub const UNGUARDED_GATE_WORKFLOW: &str = r#"
name: Unguarded
on: pull_request
jobs:
  unit-tests:
    steps:
      - run: tox -e unit
  lint:
    steps:
      - run: tox -e lint
  required-checks:
    needs: [unit-tests, lint]
    steps:
      - run: echo ok
"#;

/// A chain used to observe skip propagation and status functions.
pub const CHAIN_WORKFLOW: &str = r#"
name: Chain
on: pull_request
jobs:
  build:
    steps:
      - run: make
  test:
    needs: build
    steps:
      - run: make test
  publish:
    needs: test
    steps:
      - run: make publish
  notify-failure:
    needs: publish
    if: failure()
    steps:
      - run: echo failed
  required-checks:
    needs: [test, publish]
    if: always()
    steps:
      - run: echo done
"#;

/// Factory for test workflows.
pub struct WorkflowFixture;

impl WorkflowFixture {
    pub fn integration() -> WorkflowDefinition {
        Self::parse(INTEGRATION_WORKFLOW)
    }

    /// The integration workflow with matrix fail-fast switched off.
    pub fn integration_without_fail_fast() -> WorkflowDefinition {
        Self::parse(&INTEGRATION_WORKFLOW.replace("fail-fast: true", "fail-fast: false"))
    }

    pub fn unguarded_gate() -> WorkflowDefinition {
        Self::parse(UNGUARDED_GATE_WORKFLOW)
    }

    pub fn chain() -> WorkflowDefinition {
        Self::parse(CHAIN_WORKFLOW)
    }

    /// Parse a fixture, panicking on malformed YAML.
    pub fn parse(yaml: &str) -> WorkflowDefinition {
        WorkflowDefinition::from_yaml(yaml).expect("fixture workflow should parse")
    }

    /// Executor configuration gating on [`GATE_JOB`].
    pub fn config() -> ExecutorConfig {
        ExecutorConfig {
            workspace: PathBuf::from("."),
            gate_job: Some(GATE_JOB.to_string()),
            ..Default::default()
        }
    }
}
