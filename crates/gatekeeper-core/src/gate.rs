//! The aggregation gate.
//!
//! A gate folds the terminal results of the job groups it depends on into a
//! single pass/fail signal suitable for a required status check. It passes
//! only when every dependency reported exactly `success`. Every dependency
//! is checked and reported, so a failing run names all the culprits at once.

use crate::error::{Error, Result};
use crate::result::JobResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Exit status reported when the gate passes.
pub const EXIT_PASS: i32 = 0;
/// Exit status reported when any dependency did not succeed.
pub const EXIT_FAIL: i32 = 1;

/// Outcome of checking one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCheck {
    pub dependency: String,
    /// Raw result string as reported, `None` when the dependency was absent.
    pub observed: Option<String>,
    pub passed: bool,
}

impl GateCheck {
    fn new(dependency: &str, observed: Option<&str>) -> Self {
        let passed = observed
            .and_then(|raw| raw.parse::<JobResult>().ok())
            .is_some_and(|result| result.is_success());
        Self {
            dependency: dependency.to_string(),
            observed: observed.map(str::to_string),
            passed,
        }
    }

    /// Parsed result, if the reported string is a known one.
    pub fn result(&self) -> Option<JobResult> {
        self.observed.as_deref().and_then(|raw| raw.parse().ok())
    }
}

impl fmt::Display for GateCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.observed, self.result()) {
            (_, Some(JobResult::Success)) => write!(f, "{}: success", self.dependency),
            (None, _) => write!(
                f,
                "required dependency '{}' reported no result",
                self.dependency
            ),
            (Some(_), Some(result)) => write!(
                f,
                "dependency '{}' did not succeed (result: {})",
                self.dependency, result
            ),
            (Some(raw), None) => write!(
                f,
                "dependency '{}' reported unrecognized result '{}'",
                self.dependency, raw
            ),
        }
    }
}

/// The verdict of a gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub checks: Vec<GateCheck>,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() { EXIT_PASS } else { EXIT_FAIL }
    }

    pub fn failures(&self) -> impl Iterator<Item = &GateCheck> {
        self.checks.iter().filter(|check| !check.passed)
    }

    /// One human-readable line per failing dependency.
    pub fn diagnostics(&self) -> Vec<String> {
        self.failures().map(ToString::to_string).collect()
    }
}

/// Aggregation gate over an enumerated list of dependencies.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    required: Vec<String>,
}

impl Gate {
    /// A gate that checks whatever dependencies it is handed.
    pub fn new() -> Self {
        Self::default()
    }

    /// A gate over a fixed list of dependencies. Dependencies missing from
    /// the evaluated results fail the gate.
    pub fn requiring<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    /// Evaluate the gate against reported dependency results.
    ///
    /// With a required list, checks follow that list and any extra reported
    /// dependency is checked after it. Without one, reported dependencies
    /// are checked in name order.
    pub fn evaluate(&self, results: &BTreeMap<String, String>) -> GateVerdict {
        let mut checks: Vec<GateCheck> = self
            .required
            .iter()
            .map(|name| GateCheck::new(name, results.get(name).map(String::as_str)))
            .collect();

        checks.extend(
            results
                .iter()
                .filter(|(name, _)| !self.required.contains(name))
                .map(|(name, raw)| GateCheck::new(name, Some(raw))),
        );

        GateVerdict { checks }
    }

    /// Evaluate the gate against typed job group results.
    pub fn evaluate_results(&self, results: &BTreeMap<String, JobResult>) -> GateVerdict {
        let raw = results
            .iter()
            .map(|(name, result)| (name.clone(), result.as_str().to_string()))
            .collect();
        self.evaluate(&raw)
    }
}

/// Parse a needs payload into dependency name to raw result.
///
/// Accepts the `toJSON(needs)` shape, `{"job": {"result": "success",
/// "outputs": {}}}`, and the flat shape `{"job": "success"}`.
pub fn parse_needs_json(payload: &str) -> Result<BTreeMap<String, String>> {
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| Error::InvalidNeeds(e.to_string()))?;

    let serde_json::Value::Object(map) = value else {
        return Err(Error::InvalidNeeds(
            "expected a JSON object keyed by job name".to_string(),
        ));
    };

    map.into_iter()
        .map(|(name, entry)| {
            let result = match entry {
                serde_json::Value::String(s) => s,
                serde_json::Value::Object(mut fields) => match fields.remove("result") {
                    Some(serde_json::Value::String(s)) => s,
                    _ => {
                        return Err(Error::InvalidNeeds(format!(
                            "job '{}' has no string 'result' field",
                            name
                        )));
                    }
                },
                other => {
                    return Err(Error::InvalidNeeds(format!(
                        "job '{}' has unexpected value {}",
                        name, other
                    )));
                }
            };
            Ok((name, result))
        })
        .collect()
}

/// Parse `name=result` pairs. Later pairs override earlier ones.
pub fn parse_result_pairs<S: AsRef<str>>(pairs: &[S]) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            let pair = pair.as_ref();
            match pair.split_once('=') {
                Some((name, result)) if !name.trim().is_empty() => {
                    Ok((name.trim().to_string(), result.trim().to_string()))
                }
                _ => Err(Error::InvalidNeeds(format!(
                    "expected name=result, got '{}'",
                    pair
                ))),
            }
        })
        .collect()
}
