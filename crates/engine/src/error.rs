//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use steps::StepError;

use crate::record::{ExecutionRecord, StepStatus};

/// Why a single step failed. Recorded on the step, then fed to its
/// `onError` policy.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StepFailure {
    /// No handler is registered for the step's type. Never retried.
    #[error("unknown step type '{0}'")]
    UnknownStepType(String),

    /// A `condition` step chose a target that is missing or not ahead of it.
    /// Never retried.
    #[error("invalid branch target '{target}': {reason}")]
    InvalidBranchTarget { target: String, reason: &'static str },

    /// The handler itself failed.
    #[error(transparent)]
    Step(#[from] StepError),
}

impl StepFailure {
    /// Only handler failures can change on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Step(_))
    }
}

/// Illegal mutation of an execution record.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("execution record {0} is finalized")]
    Finalized(Uuid),

    #[error("step index {0} is out of range")]
    UnknownStep(usize),

    #[error("step '{step_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        step_id: String,
        from: StepStatus,
        to: StepStatus,
    },
}

/// Persistence failures from any store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("execution record {0} already exists")]
    Duplicate(Uuid),

    /// Updates only apply to records that exist and are still running.
    #[error("execution record {0} is missing or already finalized")]
    NotWritable(Uuid),
}

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    /// An enabled workflow has no steps.
    #[error("workflow {0} has no steps")]
    EmptyWorkflow(Uuid),

    /// Two or more steps share the same ID.
    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    /// A step has an empty ID.
    #[error("step at position {0} has an empty ID")]
    BlankStepId(usize),

    // ------ Execution errors ------

    /// A failed step had no escape policy and the workflow does not continue
    /// on error. Carries the finalized record.
    #[error("run aborted at step '{step_id}': {source}")]
    RunAborted {
        step_id: String,
        source: StepFailure,
        record: Box<ExecutionRecord>,
    },

    #[error("execution record error: {0}")]
    Record(#[from] RecordError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// The finalized record of an aborted run, if this error carries one.
    pub fn into_record(self) -> Option<ExecutionRecord> {
        match self {
            Self::RunAborted { record, .. } => Some(*record),
            _ => None,
        }
    }
}
