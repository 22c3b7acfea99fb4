//! Error types for Gatekeeper.

use crate::expression::ExpressionError;
use crate::inputs::InputError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Workflow errors
    #[error("Invalid workflow definition: {0}")]
    InvalidWorkflow(String),

    #[error("Workflow validation failed: {0}")]
    WorkflowValidation(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Workflow is not triggered by event: {0}")]
    NotTriggered(String),

    // Result errors
    #[error("Unrecognized job result: {0}")]
    UnknownResult(String),

    #[error("Invalid needs payload: {0}")]
    InvalidNeeds(String),

    // Expression and input errors
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Input(#[from] InputError),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::InvalidWorkflow(err.to_string())
    }
}
