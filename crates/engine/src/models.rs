//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory. They serialise to/from the camelCase JSON stored in the
//! `definition` column of the `workflows` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use steps::StepKind;

use crate::conditions::Condition;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// The business event that activates a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSpec {
    /// Event tag, e.g. `booking_confirmed` or `lead_created`.
    #[serde(rename = "type")]
    pub trigger_type: String,
}

/// One occurrence of a trigger, as stored on the execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "type")]
    pub trigger_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(trigger_type: impl Into<String>, data: Value) -> Self {
        Self {
            trigger_type: trigger_type.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    /// Re-invoke the handler up to `retries` times.
    Retry,
    /// Record the failure and move on to the next step.
    Skip,
    /// Abort the run unless the workflow continues on error.
    #[default]
    Fail,
}

/// Per-step `onError` policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPolicy {
    #[serde(default)]
    pub action: ErrorAction,
    #[serde(default)]
    pub retries: u32,
    /// Delay between retry attempts, in milliseconds.
    #[serde(default)]
    pub retry_delay: u64,
}

// ---------------------------------------------------------------------------
// StepDefinition
// ---------------------------------------------------------------------------

/// A single step of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Unique within the workflow; outputs are published as `steps.<id>`.
    pub id: String,
    pub name: String,
    /// Selects the registered handler.
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Input template, resolved against the run context before execution.
    #[serde(default)]
    pub action: Value,
    #[serde(default)]
    pub on_error: Option<ErrorPolicy>,
}

impl StepDefinition {
    /// Convenience constructor for testing.
    pub fn new(id: impl Into<String>, kind: StepKind, action: Value) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            enabled: true,
            action,
            on_error: None,
        }
    }

    pub fn with_on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = Some(policy);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.on_error.clone().unwrap_or_default()
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    /// Keep going after a step fails without an escape policy.
    #[serde(default)]
    pub continue_on_error: bool,
}

/// A complete, user-authored workflow definition. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    pub workspace_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub trigger: TriggerSpec,
    /// All must hold against the trigger payload for the workflow to run.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub config: WorkflowConfig,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Convenience constructor for testing.
    pub fn new(
        name: impl Into<String>,
        workspace_id: impl Into<String>,
        trigger_type: impl Into<String>,
        steps: Vec<StepDefinition>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            workspace_id: workspace_id.into(),
            enabled: true,
            trigger: TriggerSpec {
                trigger_type: trigger_type.into(),
            },
            conditions: Vec::new(),
            steps,
            config: WorkflowConfig::default(),
            created_at: Utc::now(),
        }
    }

    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }
}
