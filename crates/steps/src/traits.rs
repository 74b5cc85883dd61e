//! The `StepHandler` trait: the contract every step type must fulfil.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::{StepError, StepKind};

/// Run-time state shared with every handler of one run.
///
/// Defined here (in the steps crate) so both the engine and individual
/// handlers can import it without a circular dependency. Handlers only ever
/// receive `&ExecutionContext`; the engine alone writes `steps`.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the current run (the execution record id).
    pub run_id: Uuid,
    /// ID of the workflow definition being run.
    pub workflow_id: Uuid,
    pub workspace_id: String,
    pub user_id: String,
    /// Payload of the triggering event.
    pub trigger: Value,
    /// Step id → resolved output, in completion order.
    pub steps: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(
        run_id: Uuid,
        workflow_id: Uuid,
        workspace_id: impl Into<String>,
        user_id: impl Into<String>,
        trigger: Value,
    ) -> Self {
        Self {
            run_id,
            workflow_id,
            workspace_id: workspace_id.into(),
            user_id: user_id.into(),
            trigger,
            steps: Map::new(),
        }
    }

    /// The JSON view templates and expressions are resolved against.
    pub fn to_value(&self) -> Value {
        json!({
            "trigger": self.trigger,
            "steps": self.steps,
            "userId": self.user_id,
            "workspaceId": self.workspace_id,
            "workflowId": self.workflow_id,
            "runId": self.run_id,
        })
    }
}

/// Side-effect counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResults {
    pub emails_sent: u32,
    pub notifications_sent: u32,
    pub webhooks_called: u32,
    pub entities_created: u32,
    pub entities_updated: u32,
}

/// The core handler trait.
///
/// `input` is the step's `action` after variable resolution. The returned JSON
/// becomes `steps.<step id>` for every later step of the run.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// The step kind this handler is registered under.
    fn kind(&self) -> StepKind;

    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
        results: &mut RunResults,
    ) -> Result<Value, StepError>;
}
