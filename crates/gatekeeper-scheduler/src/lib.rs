//! Workflow scheduling for Gatekeeper.
//!
//! Expands job matrices, orders job groups over their `needs` edges and
//! executes a workflow locally through a [`gatekeeper_runner::JobRunner`].

pub mod dag;
pub mod executor;
pub mod matrix;
pub mod plan;

pub use dag::{DagBuilder, DagError, WorkflowDag};
pub use executor::{ExecutorConfig, ExecutorError, WorkflowExecutor};
pub use matrix::{MatrixError, MatrixExpander, MatrixExpansion, MatrixJob};
pub use plan::{ExecutionPlan, PlannedGroup};
