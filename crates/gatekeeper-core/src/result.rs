//! Job results and job group aggregation.

use crate::error::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Terminal outcome of one scheduled unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobResult {
    Success,
    Failure,
    Cancelled,
    Skipped,
}

impl JobResult {
    pub const ALL: [JobResult; 4] = [
        JobResult::Success,
        JobResult::Failure,
        JobResult::Cancelled,
        JobResult::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobResult::Success => "success",
            JobResult::Failure => "failure",
            JobResult::Cancelled => "cancelled",
            JobResult::Skipped => "skipped",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success)
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobResult {
    type Err = Error;

    /// Parsing is exact: `Success` or ` success` are not results.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobResult::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| Error::UnknownResult(s.to_string()))
    }
}

/// Outcome of one matrix variant of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantOutcome {
    pub display_name: String,
    #[serde(default)]
    pub matrix: BTreeMap<String, serde_json::Value>,
    pub result: JobResult,
    #[serde(default)]
    pub continue_on_error: bool,
}

impl VariantOutcome {
    pub fn new(display_name: impl Into<String>, result: JobResult) -> Self {
        Self {
            display_name: display_name.into(),
            matrix: BTreeMap::new(),
            result,
            continue_on_error: false,
        }
    }

    /// Result as seen by dependents: a tolerated failure counts as success.
    pub fn effective_result(&self) -> JobResult {
        if self.continue_on_error && self.result == JobResult::Failure {
            JobResult::Success
        } else {
            self.result
        }
    }
}

/// A named collection of variant outcomes sharing one position in the job graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobGroup {
    pub name: String,
    pub variants: Vec<VariantOutcome>,
}

impl JobGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
        }
    }

    /// A group with exactly one unparameterized variant.
    pub fn single(name: impl Into<String>, result: JobResult) -> Self {
        let name = name.into();
        let mut group = Self::new(name.clone());
        group.push(VariantOutcome::new(name, result));
        group
    }

    pub fn push(&mut self, outcome: VariantOutcome) {
        self.variants.push(outcome);
    }

    /// Overall result of the group.
    ///
    /// `success` only when there is at least one variant and all of them
    /// succeeded. Otherwise failure outranks cancellation, which outranks
    /// skipping.
    pub fn result(&self) -> JobResult {
        let results: Vec<JobResult> = self
            .variants
            .iter()
            .map(VariantOutcome::effective_result)
            .collect();

        if !results.is_empty() && results.iter().all(JobResult::is_success) {
            JobResult::Success
        } else if results.contains(&JobResult::Failure) {
            JobResult::Failure
        } else if results.contains(&JobResult::Cancelled) {
            JobResult::Cancelled
        } else {
            JobResult::Skipped
        }
    }
}
