//! Declared workflow inputs and their resolution.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// JSON-encoded array of image identifiers under test.
pub const IMAGES_INPUT: &str = "images";
/// Image the test runner itself runs in.
pub const RUNNER_IMAGE_INPUT: &str = "runner-image";
/// Free-form arguments appended to the test invocation.
pub const EXTRA_ARGUMENTS_INPUT: &str = "extra-arguments";

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("Missing required input: {0}")]
    MissingRequired(String),

    #[error("Unexpected input: {0}")]
    Undeclared(String),

    #[error("Input '{name}' expects a boolean, got '{value}'")]
    InvalidBoolean { name: String, value: String },

    #[error("Input '{name}' expects a number, got '{value}'")]
    InvalidNumber { name: String, value: String },

    #[error("Input '{name}' must be a JSON array of strings: {reason}")]
    InvalidImageList { name: String, reason: String },

    #[error("Missing required secret: {0}")]
    MissingSecret(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    String,
    Boolean,
    Number,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct InputDeclaration {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub input_type: InputType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SecretDeclaration {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Resolved input values, typed per their declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputValues(BTreeMap<String, serde_json::Value>);

impl InputValues {
    /// Resolve caller-supplied raw values against the declared inputs.
    pub fn resolve(
        declared: &BTreeMap<String, InputDeclaration>,
        supplied: &BTreeMap<String, String>,
    ) -> Result<Self, InputError> {
        if let Some(name) = supplied.keys().find(|name| !declared.contains_key(*name)) {
            return Err(InputError::Undeclared(name.clone()));
        }

        let mut values = BTreeMap::new();
        for (name, declaration) in declared {
            let value = match (supplied.get(name), &declaration.default) {
                (Some(raw), _) => coerce(name, declaration.input_type, raw)?,
                (None, Some(default)) => default.clone(),
                (None, None) if declaration.required => {
                    return Err(InputError::MissingRequired(name.clone()));
                }
                (None, None) => empty_value(declaration.input_type),
            };
            values.insert(name.clone(), value);
        }

        let resolved = Self(values);
        if declared.contains_key(IMAGES_INPUT) {
            resolved.images()?;
        }
        Ok(resolved)
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.0.insert(name.into(), value);
    }

    pub fn as_map(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.0
    }

    /// Image identifiers decoded from the JSON-encoded `images` input.
    pub fn images(&self) -> Result<Vec<String>, InputError> {
        let invalid = |reason: String| InputError::InvalidImageList {
            name: IMAGES_INPUT.to_string(),
            reason,
        };

        match self.0.get(IMAGES_INPUT) {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
            Some(serde_json::Value::String(s)) => {
                serde_json::from_str(s).map_err(|e| invalid(e.to_string()))
            }
            Some(value @ serde_json::Value::Array(_)) => {
                serde_json::from_value(value.clone()).map_err(|e| invalid(e.to_string()))
            }
            Some(other) => Err(invalid(format!("unexpected value {}", other))),
        }
    }

    pub fn runner_image(&self) -> Option<&str> {
        self.0.get(RUNNER_IMAGE_INPUT).and_then(|v| v.as_str())
    }

    pub fn extra_arguments(&self) -> &str {
        self.0
            .get(EXTRA_ARGUMENTS_INPUT)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }
}

fn coerce(name: &str, input_type: InputType, raw: &str) -> Result<serde_json::Value, InputError> {
    match input_type {
        InputType::String => Ok(serde_json::Value::String(raw.to_string())),
        InputType::Boolean => match raw.trim() {
            "true" => Ok(serde_json::Value::Bool(true)),
            "false" => Ok(serde_json::Value::Bool(false)),
            _ => Err(InputError::InvalidBoolean {
                name: name.to_string(),
                value: raw.to_string(),
            }),
        },
        InputType::Number => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .ok_or_else(|| InputError::InvalidNumber {
                name: name.to_string(),
                value: raw.to_string(),
            }),
    }
}

fn empty_value(input_type: InputType) -> serde_json::Value {
    match input_type {
        InputType::String => serde_json::Value::String(String::new()),
        InputType::Boolean => serde_json::Value::Bool(false),
        InputType::Number => serde_json::json!(0),
    }
}

/// Check that every required secret has been supplied.
pub fn check_secrets(
    declared: &BTreeMap<String, SecretDeclaration>,
    supplied: &BTreeMap<String, String>,
) -> Result<(), InputError> {
    match declared
        .iter()
        .find(|(name, decl)| decl.required && !supplied.contains_key(*name))
    {
        Some((name, _)) => Err(InputError::MissingSecret(name.clone())),
        None => Ok(()),
    }
}
