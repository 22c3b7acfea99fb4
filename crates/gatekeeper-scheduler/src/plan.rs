//! Static execution plan: job groups in dependency order with their variants.

use crate::dag::DagBuilder;
use crate::executor::{ExecutorConfig, ExecutorError};
use crate::matrix::MatrixExpander;
use gatekeeper_core::ids::RunId;
use gatekeeper_core::workflow::WorkflowDefinition;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedGroup {
    pub job: String,
    pub display_name: String,
    pub needs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub fail_fast: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<u32>,
    /// Variant display names; empty for a matrix with no combinations.
    pub variants: Vec<String>,
    /// Set for reusable workflow jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub workflow: String,
    pub groups: Vec<PlannedGroup>,
}

impl ExecutionPlan {
    /// Plan `workflow` with the inputs in `config`. Matrix axes driven by
    /// `needs` outputs cannot be known ahead of a run and fail planning.
    pub fn build(
        workflow: &WorkflowDefinition,
        config: &ExecutorConfig,
    ) -> Result<Self, ExecutorError> {
        workflow.validate()?;
        let dag = DagBuilder::new().build(workflow)?;
        let ctx = config.expression_context(workflow, RunId::new())?;
        let expander = MatrixExpander::new();

        let groups = dag
            .topological_order()?
            .into_iter()
            .map(|node| {
                let definition = &node.definition;
                let expansion = expander
                    .expand(&node.name, definition, &ctx)
                    .map_err(|e| gatekeeper_core::Error::WorkflowValidation(e.to_string()))?;

                Ok(PlannedGroup {
                    job: node.name.clone(),
                    display_name: definition.display_name(&node.name).to_string(),
                    needs: definition.needs.clone(),
                    condition: definition.condition.clone(),
                    fail_fast: expansion.fail_fast,
                    max_parallel: expansion.max_parallel,
                    variants: expansion.jobs.into_iter().map(|j| j.display_name).collect(),
                    uses: definition.uses.clone(),
                })
            })
            .collect::<Result<Vec<_>, ExecutorError>>()?;

        Ok(Self {
            workflow: workflow.name.clone(),
            groups,
        })
    }

    pub fn variant_count(&self) -> usize {
        self.groups.iter().map(|g| g.variants.len()).sum()
    }
}
