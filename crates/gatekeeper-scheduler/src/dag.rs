//! DAG resolution for workflow jobs.

use gatekeeper_core::workflow::{JobDefinition, WorkflowDefinition};
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DagError {
    #[error("Cycle detected in job dependencies involving '{0}'")]
    CycleDetected(String),
    #[error("Job '{job}' needs unknown job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },
    #[error("Job '{0}' needs itself")]
    SelfDependency(String),
    #[error("Workflow has no jobs")]
    EmptyWorkflow,
}

/// A node in the job DAG.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub name: String,
    pub definition: JobDefinition,
}

/// Directed acyclic graph of jobs; an edge runs from a job to each job
/// that needs it.
#[derive(Debug)]
pub struct WorkflowDag {
    graph: DiGraph<DagNode, ()>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl WorkflowDag {
    /// Jobs with no `needs`.
    pub fn roots(&self) -> Vec<&DagNode> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Jobs that directly need `job`.
    pub fn successors(&self, job: &str) -> Vec<&DagNode> {
        self.neighbors(job, Direction::Outgoing)
    }

    /// Jobs `job` directly needs.
    pub fn predecessors(&self, job: &str) -> Vec<&DagNode> {
        self.neighbors(job, Direction::Incoming)
    }

    /// Every job `job` transitively needs.
    pub fn ancestors(&self, job: &str) -> BTreeSet<String> {
        let Some(&start) = self.name_to_index.get(job) else {
            return BTreeSet::new();
        };

        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut ancestors = BTreeSet::new();
        while let Some(idx) = dfs.next(reversed) {
            if idx != start {
                ancestors.insert(self.graph[idx].name.clone());
            }
        }
        ancestors
    }

    pub fn topological_order(&self) -> Result<Vec<&DagNode>, DagError> {
        toposort(&self.graph, None)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx))
                    .collect()
            })
            .map_err(|cycle| DagError::CycleDetected(self.graph[cycle.node_id()].name.clone()))
    }

    pub fn jobs(&self) -> Vec<&DagNode> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    pub fn node(&self, job: &str) -> Option<&DagNode> {
        self.name_to_index
            .get(job)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Whether every job `job` needs has reached a terminal state.
    pub fn is_ready(&self, job: &str, decided: &BTreeSet<String>) -> bool {
        self.predecessors(job)
            .iter()
            .all(|pred| decided.contains(&pred.name))
    }

    fn neighbors(&self, job: &str, direction: Direction) -> Vec<&DagNode> {
        self.name_to_index
            .get(job)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, direction)
                    .filter_map(|n| self.graph.node_weight(n))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Builder for constructing job DAGs.
#[derive(Debug, Default)]
pub struct DagBuilder;

impl DagBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a DAG from a workflow's `needs` edges.
    pub fn build(&self, workflow: &WorkflowDefinition) -> Result<WorkflowDag, DagError> {
        if workflow.jobs.is_empty() {
            return Err(DagError::EmptyWorkflow);
        }

        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for (name, definition) in &workflow.jobs {
            let idx = graph.add_node(DagNode {
                name: name.clone(),
                definition: definition.clone(),
            });
            name_to_index.insert(name.clone(), idx);
        }

        for (name, definition) in &workflow.jobs {
            let job_idx = name_to_index[name];
            for dependency in &definition.needs {
                if dependency == name {
                    return Err(DagError::SelfDependency(name.clone()));
                }
                let dep_idx =
                    name_to_index
                        .get(dependency)
                        .ok_or_else(|| DagError::UnknownDependency {
                            job: name.clone(),
                            dependency: dependency.clone(),
                        })?;
                graph.update_edge(*dep_idx, job_idx, ());
            }
        }

        let dag = WorkflowDag {
            graph,
            name_to_index,
        };

        dag.topological_order()?;

        Ok(dag)
    }
}
