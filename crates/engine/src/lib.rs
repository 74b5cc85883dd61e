//! `engine` crate: workflow definitions, the execution engine, the trigger
//! dispatcher and execution-record persistence.

pub mod conditions;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod inflight;
pub mod models;
pub mod record;
pub mod store;
pub mod validate;

pub use conditions::{Condition, ConditionOperator};
pub use dispatcher::TriggerDispatcher;
pub use error::{EngineError, RecordError, StepFailure, StoreError};
pub use executor::{BranchTargetPolicy, ExecutorConfig, WorkflowExecutor};
pub use inflight::{RunRegistry, RunSnapshot};
pub use models::{ErrorAction, ErrorPolicy, StepDefinition, TriggerEvent, WorkflowDefinition};
pub use record::{ExecutionRecord, RunMetrics, RunStatus, StepRecord, StepStatus};
pub use store::{DefinitionSource, ExecutionStore, InMemoryStore, PgStore, StatsSink};
pub use validate::validate_definition;

#[cfg(test)]
mod executor_tests;
