//! The execution record: the ledger of one workflow run.
//!
//! Every state change goes through a method here so the metrics always agree
//! with the step statuses, and so a finalized record cannot be touched again.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use steps::{RunResults, StepKind};

use crate::error::RecordError;
use crate::models::{TriggerEvent, WorkflowDefinition};

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Overall run outcome. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub status: StepStatus,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
    /// Retry attempts made after the first failure.
    pub retries: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub total_steps: u32,
    pub completed_steps: u32,
    pub skipped_steps: u32,
    pub failed_steps: u32,
}

impl RunMetrics {
    /// Steps that reached a terminal status.
    pub fn settled(&self) -> u32 {
        self.completed_steps + self.skipped_steps + self.failed_steps
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub workspace_id: String,
    pub user_id: String,
    pub trigger: TriggerEvent,
    pub status: RunStatus,
    pub steps: Vec<StepRecord>,
    pub metrics: RunMetrics,
    pub results: RunResults,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl ExecutionRecord {
    /// Open a record for a new run. Disabled steps are skipped up front.
    pub fn new(definition: &WorkflowDefinition, trigger: TriggerEvent, user_id: &str) -> Self {
        let steps: Vec<StepRecord> = definition
            .steps
            .iter()
            .map(|step| StepRecord {
                step_id: step.id.clone(),
                name: step.name.clone(),
                kind: step.kind.clone(),
                status: if step.enabled {
                    StepStatus::Pending
                } else {
                    StepStatus::Skipped
                },
                input: None,
                output: None,
                error: None,
                retries: 0,
                started_at: None,
                finished_at: None,
            })
            .collect();

        let metrics = RunMetrics {
            total_steps: steps.len() as u32,
            skipped_steps: steps
                .iter()
                .filter(|s| s.status == StepStatus::Skipped)
                .count() as u32,
            ..RunMetrics::default()
        };

        Self {
            id: Uuid::new_v4(),
            workflow_id: definition.id,
            workflow_name: definition.name.clone(),
            workspace_id: definition.workspace_id.clone(),
            user_id: user_id.to_owned(),
            trigger,
            status: RunStatus::Running,
            steps,
            metrics,
            results: RunResults::default(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.status != RunStatus::Running
    }

    pub fn step(&self, step_id: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    // -----------------------------------------------------------------------
    // Step transitions
    // -----------------------------------------------------------------------

    /// `pending → running`
    pub fn start_step(&mut self, index: usize, input: Value) -> Result<(), RecordError> {
        let step = self.transition(index, &[StepStatus::Pending], StepStatus::Running)?;
        step.input = Some(input);
        step.started_at = Some(Utc::now());
        Ok(())
    }

    /// `running → completed`
    pub fn complete_step(&mut self, index: usize, output: Value) -> Result<(), RecordError> {
        let step = self.transition(index, &[StepStatus::Running], StepStatus::Completed)?;
        step.output = Some(output);
        step.finished_at = Some(Utc::now());
        self.metrics.completed_steps += 1;
        Ok(())
    }

    /// `running → failed`
    pub fn fail_step(&mut self, index: usize, error: String) -> Result<(), RecordError> {
        let step = self.transition(index, &[StepStatus::Running], StepStatus::Failed)?;
        step.error = Some(error);
        step.finished_at = Some(Utc::now());
        self.metrics.failed_steps += 1;
        Ok(())
    }

    /// Count a retry attempt on a failed step.
    pub fn note_retry(&mut self, index: usize, attempt: u32) -> Result<(), RecordError> {
        let step = self.transition(index, &[StepStatus::Failed], StepStatus::Failed)?;
        step.retries = attempt;
        Ok(())
    }

    /// `failed → completed` after a successful retry; the failure no longer
    /// counts.
    pub fn recover_step(&mut self, index: usize, output: Value) -> Result<(), RecordError> {
        let step = self.transition(index, &[StepStatus::Failed], StepStatus::Completed)?;
        step.output = Some(output);
        step.error = None;
        step.finished_at = Some(Utc::now());
        self.metrics.failed_steps -= 1;
        self.metrics.completed_steps += 1;
        Ok(())
    }

    /// `pending → skipped` for steps jumped over by a branch.
    pub fn skip_step(&mut self, index: usize) -> Result<(), RecordError> {
        self.transition(index, &[StepStatus::Pending], StepStatus::Skipped)?;
        self.metrics.skipped_steps += 1;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Finalization
    // -----------------------------------------------------------------------

    /// `running → completed` for the whole run.
    pub fn complete(&mut self) -> Result<(), RecordError> {
        self.finalize(RunStatus::Completed, None)
    }

    /// `running → failed` for the whole run.
    pub fn fail(&mut self, error: String) -> Result<(), RecordError> {
        self.finalize(RunStatus::Failed, Some(error))
    }

    fn finalize(&mut self, status: RunStatus, error: Option<String>) -> Result<(), RecordError> {
        self.ensure_open()?;
        let finished = Utc::now();
        self.status = status;
        self.error = error;
        self.finished_at = Some(finished);
        self.duration_ms = Some((finished - self.started_at).num_milliseconds().max(0) as u64);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), RecordError> {
        if self.is_finalized() {
            return Err(RecordError::Finalized(self.id));
        }
        Ok(())
    }

    fn transition(
        &mut self,
        index: usize,
        from: &[StepStatus],
        to: StepStatus,
    ) -> Result<&mut StepRecord, RecordError> {
        self.ensure_open()?;
        let step = self
            .steps
            .get_mut(index)
            .ok_or(RecordError::UnknownStep(index))?;
        if !from.contains(&step.status) {
            return Err(RecordError::InvalidTransition {
                step_id: step.step_id.clone(),
                from: step.status,
                to,
            });
        }
        step.status = to;
        Ok(step)
    }
}
