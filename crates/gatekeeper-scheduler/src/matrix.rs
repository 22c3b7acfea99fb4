//! Matrix expansion for job fan-out.

use gatekeeper_core::expression::{ExpressionContext, ExpressionError, stringify};
use gatekeeper_core::ids::{JobId, MatrixId};
use gatekeeper_core::workflow::{JobDefinition, MatrixConfig};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

type Combination = BTreeMap<String, Value>;

#[derive(Debug, Error, PartialEq)]
pub enum MatrixError {
    #[error("Matrix axis '{axis}' of job '{job}' must be a list, got {found}")]
    NotAList {
        job: String,
        axis: String,
        found: String,
    },
    #[error("Matrix axis '{axis}' of job '{job}': {source}")]
    Axis {
        job: String,
        axis: String,
        #[source]
        source: ExpressionError,
    },
    #[error("Display name of job '{job}': {source}")]
    DisplayName {
        job: String,
        #[source]
        source: ExpressionError,
    },
}

/// A single variant of an expanded job.
#[derive(Debug, Clone)]
pub struct MatrixJob {
    pub id: JobId,
    pub matrix_id: MatrixId,
    pub job_id: String,
    pub index: usize,
    pub values: BTreeMap<String, Value>,
    pub display_name: String,
}

/// Result of matrix expansion.
#[derive(Debug, Clone)]
pub struct MatrixExpansion {
    pub matrix_id: MatrixId,
    pub job_id: String,
    pub jobs: Vec<MatrixJob>,
    pub fail_fast: bool,
    pub max_parallel: Option<u32>,
}

/// Expander for matrix configurations.
#[derive(Debug, Default)]
pub struct MatrixExpander;

impl MatrixExpander {
    pub fn new() -> Self {
        Self
    }

    /// Expand a job into its variants. A job without a matrix yields one
    /// variant; a matrix whose combinations are all excluded yields none.
    pub fn expand(
        &self,
        job_id: &str,
        job: &JobDefinition,
        expressions: &ExpressionContext,
    ) -> Result<MatrixExpansion, MatrixError> {
        let combinations = match job.matrix() {
            Some(matrix) => self.combinations(job_id, matrix, expressions)?,
            None => vec![Combination::new()],
        };

        let matrix_id = MatrixId::new();
        let jobs = combinations
            .into_iter()
            .enumerate()
            .map(|(index, values)| {
                let display_name = self.format_display_name(job_id, job, &values, expressions)?;
                Ok(MatrixJob {
                    id: JobId::new(),
                    matrix_id,
                    job_id: job_id.to_string(),
                    index,
                    values,
                    display_name,
                })
            })
            .collect::<Result<Vec<_>, MatrixError>>()?;

        Ok(MatrixExpansion {
            matrix_id,
            job_id: job_id.to_string(),
            jobs,
            fail_fast: job.fail_fast(),
            max_parallel: job.max_parallel(),
        })
    }

    /// Cartesian product of the axes, minus `exclude`, then `include`.
    ///
    /// An `include` entry is merged into every base combination whose axis
    /// values it does not contradict; an entry matching none is appended.
    fn combinations(
        &self,
        job_id: &str,
        matrix: &MatrixConfig,
        expressions: &ExpressionContext,
    ) -> Result<Vec<Combination>, MatrixError> {
        let axes = matrix
            .axes
            .iter()
            .map(|(axis, raw)| Ok((axis.clone(), self.resolve_axis(job_id, axis, raw, expressions)?)))
            .collect::<Result<Vec<_>, MatrixError>>()?;

        let mut combinations = self.generate_combinations(&axes);

        combinations.retain(|combo| {
            !matrix
                .exclude
                .iter()
                .any(|exclude| self.matches_partial(combo, exclude))
        });

        let base_len = combinations.len();
        for include in &matrix.include {
            let mut merged = false;
            for combo in combinations.iter_mut().take(base_len) {
                let compatible = include
                    .iter()
                    .filter(|(key, _)| matrix.axes.contains_key(*key))
                    .all(|(key, value)| combo.get(key) == Some(value));
                if compatible {
                    combo.extend(include.iter().map(|(k, v)| (k.clone(), v.clone())));
                    merged = true;
                }
            }
            if !merged {
                combinations.push(include.clone());
            }
        }

        Ok(combinations)
    }

    fn resolve_axis(
        &self,
        job_id: &str,
        axis: &str,
        raw: &Value,
        expressions: &ExpressionContext,
    ) -> Result<Vec<Value>, MatrixError> {
        let value = match raw {
            Value::String(expr) => {
                expressions
                    .evaluate(expr)
                    .map_err(|source| MatrixError::Axis {
                        job: job_id.to_string(),
                        axis: axis.to_string(),
                        source,
                    })?
            }
            other => other.clone(),
        };

        match value {
            Value::Array(values) => Ok(values),
            other => Err(MatrixError::NotAList {
                job: job_id.to_string(),
                axis: axis.to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn generate_combinations(&self, axes: &[(String, Vec<Value>)]) -> Vec<Combination> {
        if axes.is_empty() {
            return Vec::new();
        }

        let mut result = vec![Combination::new()];

        for (key, values) in axes {
            let mut next = Vec::with_capacity(result.len() * values.len());

            for combo in &result {
                for value in values {
                    let mut combo = combo.clone();
                    combo.insert(key.clone(), value.clone());
                    next.push(combo);
                }
            }

            result = next;
        }

        result
    }

    fn matches_partial(&self, combo: &Combination, filter: &Combination) -> bool {
        filter
            .iter()
            .all(|(key, value)| combo.get(key) == Some(value))
    }

    fn format_display_name(
        &self,
        job_id: &str,
        job: &JobDefinition,
        values: &Combination,
        expressions: &ExpressionContext,
    ) -> Result<String, MatrixError> {
        let base = job.display_name(job_id);

        if base.contains("${{") {
            let mut ctx = expressions.clone();
            ctx.matrix = values.clone();
            return ctx
                .interpolate(base)
                .map_err(|source| MatrixError::DisplayName {
                    job: job_id.to_string(),
                    source,
                });
        }

        if values.is_empty() {
            return Ok(base.to_string());
        }

        let parts: Vec<String> = values
            .iter()
            .map(|(k, v)| format!("{}={}", k, stringify(v)))
            .collect();

        Ok(format!("{} ({})", base, parts.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn job(yaml: &str) -> JobDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn names(expansion: &MatrixExpansion) -> Vec<String> {
        expansion.jobs.iter().map(|j| j.display_name.clone()).collect()
    }

    #[test]
    fn test_matrix_expansion() {
        let def = job(r#"
strategy:
  max-parallel: 4
  matrix:
    units: [1, 3]
    source: [juju-config, relation, secret]
steps:
  - run: tox
"#);
        let expansion = MatrixExpander::new()
            .expand("integration-tests", &def, &ExpressionContext::new())
            .unwrap();

        assert_eq!(expansion.jobs.len(), 6);
        assert!(expansion.fail_fast);
        assert_eq!(expansion.max_parallel, Some(4));
        assert_eq!(
            expansion.jobs[0].display_name,
            "integration-tests (source=juju-config, units=1)"
        );
        assert_eq!(expansion.jobs[5].index, 5);
        assert!(expansion.jobs.iter().all(|j| j.matrix_id == expansion.matrix_id));
    }

    #[test]
    fn test_matrix_with_exclude() {
        let def = job(r#"
strategy:
  fail-fast: false
  matrix:
    units: [1, 3]
    source: [juju-config, relation]
    exclude:
      - units: 3
        source: relation
steps:
  - run: tox
"#);
        let expansion = MatrixExpander::new()
            .expand("t", &def, &ExpressionContext::new())
            .unwrap();

        assert_eq!(expansion.jobs.len(), 3);
        assert!(!expansion.fail_fast);
        assert!(!names(&expansion).contains(&"t (source=relation, units=3)".to_string()));
    }

    #[test]
    fn test_partial_exclude_removes_every_match() {
        let def = job(r#"
strategy:
  matrix:
    units: [1, 3]
    source: [juju-config, relation]
    exclude:
      - units: 3
steps:
  - run: tox
"#);
        let expansion = MatrixExpander::new()
            .expand("t", &def, &ExpressionContext::new())
            .unwrap();
        assert_eq!(
            names(&expansion),
            vec!["t (source=juju-config, units=1)", "t (source=relation, units=1)"]
        );
    }

    #[test]
    fn test_include_merges_and_appends() {
        let def = job(r#"
strategy:
  matrix:
    units: [1, 3]
    include:
      - units: 3
        experimental: true
      - units: 5
steps:
  - run: tox
"#);
        let expansion = MatrixExpander::new()
            .expand("t", &def, &ExpressionContext::new())
            .unwrap();

        assert_eq!(
            names(&expansion),
            vec!["t (units=1)", "t (experimental=true, units=3)", "t (units=5)"]
        );
        assert_eq!(expansion.jobs[1].values["experimental"], json!(true));
    }

    #[test]
    fn test_include_only_matrix() {
        let def = job(r#"
strategy:
  matrix:
    include:
      - image: wordpress:6.4
      - image: wordpress:6.5
steps:
  - run: tox
"#);
        let expansion = MatrixExpander::new()
            .expand("t", &def, &ExpressionContext::new())
            .unwrap();
        assert_eq!(
            names(&expansion),
            vec!["t (image=wordpress:6.4)", "t (image=wordpress:6.5)"]
        );
    }

    #[test]
    fn test_axis_from_expression() {
        let def = job(r#"
name: Integration ${{ matrix.image }}
strategy:
  matrix:
    image: ${{ fromJSON(inputs.images) }}
steps:
  - run: tox
"#);
        let mut ctx = ExpressionContext::new();
        ctx.inputs
            .insert("images".into(), json!(r#"["wordpress:6.4", "wordpress:6.5"]"#));

        let expansion = MatrixExpander::new().expand("t", &def, &ctx).unwrap();
        assert_eq!(
            names(&expansion),
            vec!["Integration wordpress:6.4", "Integration wordpress:6.5"]
        );
    }

    #[test]
    fn test_zero_combinations() {
        let def = job(r#"
strategy:
  matrix:
    image: ${{ fromJSON(inputs.images) }}
steps:
  - run: tox
"#);
        let mut ctx = ExpressionContext::new();
        ctx.inputs.insert("images".into(), json!("[]"));

        let expansion = MatrixExpander::new().expand("t", &def, &ctx).unwrap();
        assert!(expansion.jobs.is_empty());
    }

    #[test]
    fn test_no_matrix_single_variant() {
        let def = job("name: Unit tests\nsteps:\n  - run: tox -e unit\n");
        let expansion = MatrixExpander::new()
            .expand("unit-tests", &def, &ExpressionContext::new())
            .unwrap();
        assert_eq!(names(&expansion), vec!["Unit tests"]);
        assert!(expansion.jobs[0].values.is_empty());
    }

    #[test]
    fn test_axis_must_be_list() {
        let def = job("strategy:\n  matrix:\n    units: ${{ inputs.count }}\nsteps:\n  - run: x\n");
        let mut ctx = ExpressionContext::new();
        ctx.inputs.insert("count".into(), json!(3));

        let err = MatrixExpander::new().expand("t", &def, &ctx).unwrap_err();
        assert!(matches!(err, MatrixError::NotAList { .. }));
    }
}
