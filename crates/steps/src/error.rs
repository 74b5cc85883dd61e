//! Step-level error type.

use thiserror::Error;

/// Errors returned by a step handler's `execute` method.
///
/// Every variant is a normal step failure: the engine records it on the
/// execution record and then applies the step's `onError` policy.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StepError {
    /// A required input was absent, empty, or still an unresolved `${...}`
    /// reference (usually an upstream step that never produced it).
    #[error("missing dependency for '{step_type}': '{field}' is not available")]
    MissingDependency { step_type: String, field: String },

    /// The resolved action payload is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A `condition` expression could not be parsed or evaluated.
    #[error("expression error: {0}")]
    Expression(String),

    /// The external call behind the handler failed.
    #[error("handler error: {0}")]
    Handler(String),
}

impl StepError {
    pub fn missing(step_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingDependency {
            step_type: step_type.into(),
            field: field.into(),
        }
    }

    /// Wrap a collaborator failure, keeping the whole cause chain in the message.
    pub fn handler(err: anyhow::Error) -> Self {
        Self::Handler(format!("{err:#}"))
    }
}
