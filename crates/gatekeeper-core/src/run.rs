//! Run report types.

use crate::gate::GateVerdict;
use crate::ids::{JobId, RunId};
use crate::result::{JobGroup, JobResult, VariantOutcome};
use crate::workflow::TriggerEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Record of one executed (or never started) matrix variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub job: String,
    pub display_name: String,
    pub index: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub matrix: BTreeMap<String, serde_json::Value>,
    pub result: JobResult,
    #[serde(default)]
    pub continue_on_error: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub exit_code: Option<i32>,
    pub diagnostic: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
}

impl JobRecord {
    pub fn outcome(&self) -> VariantOutcome {
        VariantOutcome {
            display_name: self.display_name.clone(),
            matrix: self.matrix.clone(),
            result: self.result,
            continue_on_error: self.continue_on_error,
        }
    }
}

/// Record of one job group: all variants of a job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub job: String,
    pub display_name: String,
    pub result: JobResult,
    pub variants: Vec<JobRecord>,
    /// Why the group did not run, when it never started.
    pub reason: Option<String>,
}

impl GroupRecord {
    /// A group decided without running any variant.
    pub fn not_run(
        job: impl Into<String>,
        display_name: impl Into<String>,
        result: JobResult,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            job: job.into(),
            display_name: display_name.into(),
            result,
            variants: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    /// A group whose result is aggregated from its variants.
    pub fn from_variants(
        job: impl Into<String>,
        display_name: impl Into<String>,
        variants: Vec<JobRecord>,
    ) -> Self {
        let job = job.into();
        let mut group = JobGroup::new(job.clone());
        for variant in &variants {
            group.push(variant.outcome());
        }
        Self {
            result: group.result(),
            job,
            display_name: display_name.into(),
            variants,
            reason: None,
        }
    }

    /// Outputs published to dependents; later variants override earlier ones.
    pub fn outputs(&self) -> BTreeMap<String, String> {
        self.variants
            .iter()
            .flat_map(|v| v.outputs.clone())
            .collect()
    }
}

/// Summary of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub id: RunId,
    pub workflow: String,
    pub event: TriggerEvent,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Job groups in the order they were decided.
    pub groups: Vec<GroupRecord>,
    pub gate: Option<GateVerdict>,
}

impl RunReport {
    pub fn group(&self, job: &str) -> Option<&GroupRecord> {
        self.groups.iter().find(|g| g.job == job)
    }

    pub fn result_of(&self, job: &str) -> Option<JobResult> {
        self.group(job).map(|g| g.result)
    }

    /// The gate verdict when one was evaluated; otherwise no group failed
    /// or was cancelled.
    pub fn success(&self) -> bool {
        match &self.gate {
            Some(verdict) => verdict.passed(),
            None => self
                .groups
                .iter()
                .all(|g| !matches!(g.result, JobResult::Failure | JobResult::Cancelled)),
        }
    }
}
