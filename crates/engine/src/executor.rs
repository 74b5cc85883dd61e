//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the central orchestrator:
//! 1. Validates the definition and opens an `ExecutionRecord`.
//! 2. Walks the steps in declared order, resolving each step's `action`
//!    template against the run context and dispatching it via `StepHandler`.
//! 3. Publishes each step's output as `steps.<id>` for later templates.
//! 4. Applies the step's `onError` policy (retry / skip / fail) and the
//!    workflow's `continueOnError` flag to failures.
//! 5. Honours `condition` branches by skipping the steps jumped over.
//! 6. Finalizes the record, persists it and reports run statistics.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use steps::resolver::resolve;
use steps::{ExecutionContext, RunResults, StepError, StepKind, StepRegistry};

use crate::error::{EngineError, StepFailure};
use crate::inflight::RunRegistry;
use crate::models::{ErrorAction, TriggerEvent, WorkflowDefinition};
use crate::record::{ExecutionRecord, RunStatus, StepStatus};
use crate::store::{ExecutionStore, StatsSink};
use crate::validate::validate_definition;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a `condition` step names a target that is missing or not
/// ahead of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchTargetPolicy {
    /// Fail the condition step with `InvalidBranchTarget`.
    #[default]
    Fail,
    /// Log a warning and carry on with the next step in order.
    Continue,
}

impl FromStr for BranchTargetPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(Self::Fail),
            "continue" => Ok(Self::Continue),
            other => Err(format!("unknown branch target policy: {other}")),
        }
    }
}

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound for a single `wait` step; handed to the built-in registry.
    pub max_wait: Duration,
    pub branch_target_policy: BranchTargetPolicy,
    /// Write the record back to the store after every step, not only at the end.
    pub persist_progress: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(24 * 60 * 60),
            branch_target_policy: BranchTargetPolicy::Fail,
            persist_progress: true,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Runs one workflow definition per call. Shared across concurrent runs.
pub struct WorkflowExecutor {
    registry: StepRegistry,
    store: Arc<dyn ExecutionStore>,
    stats: Arc<dyn StatsSink>,
    config: ExecutorConfig,
    in_flight: RunRegistry,
}

impl WorkflowExecutor {
    pub fn new(
        registry: StepRegistry,
        store: Arc<dyn ExecutionStore>,
        stats: Arc<dyn StatsSink>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            store,
            stats,
            config,
            in_flight: RunRegistry::new(),
        }
    }

    /// Runs currently executing on this executor.
    pub fn in_flight(&self) -> &RunRegistry {
        &self.in_flight
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run the workflow against one trigger event and return the finalized
    /// record.
    ///
    /// # Errors
    /// - Validation errors before any step runs; no record is created.
    /// - [`EngineError::Store`] if the opening record cannot be persisted.
    /// - [`EngineError::RunAborted`] when a step failure stops the run. The
    ///   error carries the finalized `failed` record.
    #[instrument(
        skip(self, definition, event),
        fields(workflow_id = %definition.id, trigger = %event.trigger_type)
    )]
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        event: TriggerEvent,
        user_id: &str,
    ) -> Result<ExecutionRecord, EngineError> {
        validate_definition(definition)?;

        let mut record = ExecutionRecord::new(definition, event, user_id);
        let mut ctx = ExecutionContext::new(
            record.id,
            definition.id,
            definition.workspace_id.as_str(),
            user_id,
            record.trigger.data.clone(),
        );

        self.store.insert(&record).await?;
        let _guard = self.in_flight.track(&record);
        info!(run_id = %record.id, steps = definition.steps.len(), "workflow run started");

        let mut index = 0;
        while index < definition.steps.len() {
            let step = &definition.steps[index];

            if !step.enabled {
                debug!(step_id = %step.id, "step disabled, skipped");
                index += 1;
                continue;
            }

            let input = resolve(&step.action, &ctx.to_value());
            record.start_step(index, input.clone())?;
            self.in_flight.update(&record, Some(&step.id));

            let mut branch = None;
            match self.run_step(definition, index, &input, &ctx, &mut record.results).await {
                Ok((output, target)) => {
                    ctx.steps.insert(step.id.clone(), output.clone());
                    record.complete_step(index, output)?;
                    branch = target;
                    debug!(step_id = %step.id, "step completed");
                }
                Err(failure) => {
                    warn!(step_id = %step.id, error = %failure, "step failed");
                    record.fail_step(index, failure.to_string())?;

                    let policy = step.error_policy();
                    let mut recovered = None;
                    if policy.action == ErrorAction::Retry && failure.is_retryable() {
                        recovered = self
                            .retry(definition, index, &input, &ctx, &mut record, policy.retries, policy.retry_delay)
                            .await?;
                    }

                    match recovered {
                        Some((output, target)) => {
                            ctx.steps.insert(step.id.clone(), output.clone());
                            record.recover_step(index, output)?;
                            branch = target;
                        }
                        None if policy.action == ErrorAction::Skip => {
                            info!(step_id = %step.id, "failure skipped by step policy");
                        }
                        None if definition.config.continue_on_error => {
                            warn!(step_id = %step.id, "continuing past failed step");
                        }
                        None => {
                            return Err(self.abort(record, &step.id, failure).await);
                        }
                    }
                }
            }

            index = match branch {
                Some(target) => {
                    for skipped in index + 1..target {
                        if record.steps[skipped].status == StepStatus::Pending {
                            record.skip_step(skipped)?;
                        }
                    }
                    debug!(from = %step.id, to = %definition.steps[target].id, "branch taken");
                    target
                }
                None => index + 1,
            };

            if self.config.persist_progress {
                self.persist_progress(&record).await;
            }
        }

        record.complete()?;
        self.finish(&record).await;
        info!(
            run_id = %record.id,
            duration_ms = record.duration_ms.unwrap_or_default(),
            completed = record.metrics.completed_steps,
            skipped = record.metrics.skipped_steps,
            failed = record.metrics.failed_steps,
            "workflow run completed"
        );
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Internal: one handler invocation plus branch resolution.
    // -----------------------------------------------------------------------

    async fn run_step(
        &self,
        definition: &WorkflowDefinition,
        index: usize,
        input: &Value,
        ctx: &ExecutionContext,
        results: &mut RunResults,
    ) -> Result<(Value, Option<usize>), StepFailure> {
        let step = &definition.steps[index];
        let handler = self
            .registry
            .get(&step.kind)
            .ok_or_else(|| StepFailure::UnknownStepType(step.kind.to_string()))?;

        let output = AssertUnwindSafe(handler.execute(input.clone(), ctx, results))
            .catch_unwind()
            .await
            .map_err(|payload| {
                StepError::Handler(format!("handler panicked: {}", panic_message(&*payload)))
            })??;

        let target = if step.kind == StepKind::Condition {
            self.branch_target(definition, index, &output)?
        } else {
            None
        };
        Ok((output, target))
    }

    /// Index of the step a condition output jumps to, if any.
    fn branch_target(
        &self,
        definition: &WorkflowDefinition,
        index: usize,
        output: &Value,
    ) -> Result<Option<usize>, StepFailure> {
        let Some(target) = output.get("nextStepId").and_then(Value::as_str) else {
            return Ok(None);
        };

        let invalid = match definition.step_index(target) {
            Some(position) if position > index => return Ok(Some(position)),
            Some(_) => StepFailure::InvalidBranchTarget {
                target: target.to_owned(),
                reason: "target is not after the condition step",
            },
            None => StepFailure::InvalidBranchTarget {
                target: target.to_owned(),
                reason: "no step with this id",
            },
        };

        match self.config.branch_target_policy {
            BranchTargetPolicy::Fail => Err(invalid),
            BranchTargetPolicy::Continue => {
                warn!(error = %invalid, "ignoring branch target, continuing in order");
                Ok(None)
            }
        }
    }

    /// Re-invoke a failed step up to `retries` times. Returns the first
    /// successful outcome, or `None` once attempts run out or a
    /// non-retryable failure shows up.
    #[allow(clippy::too_many_arguments)]
    async fn retry(
        &self,
        definition: &WorkflowDefinition,
        index: usize,
        input: &Value,
        ctx: &ExecutionContext,
        record: &mut ExecutionRecord,
        retries: u32,
        retry_delay: u64,
    ) -> Result<Option<(Value, Option<usize>)>, EngineError> {
        let step_id = &definition.steps[index].id;

        for attempt in 1..=retries {
            tokio::time::sleep(Duration::from_millis(retry_delay)).await;
            record.note_retry(index, attempt)?;

            match self.run_step(definition, index, input, ctx, &mut record.results).await {
                Ok(outcome) => {
                    info!(step_id = %step_id, attempt, "step recovered on retry");
                    return Ok(Some(outcome));
                }
                Err(failure) if failure.is_retryable() => {
                    warn!(step_id = %step_id, attempt, retries, error = %failure, "retry failed");
                }
                Err(failure) => {
                    warn!(step_id = %step_id, attempt, error = %failure, "retry hit a terminal failure");
                    return Ok(None);
                }
            }
        }

        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Internal: finalization and persistence.
    // -----------------------------------------------------------------------

    async fn abort(
        &self,
        mut record: ExecutionRecord,
        step_id: &str,
        failure: StepFailure,
    ) -> EngineError {
        if let Err(e) = record.fail(format!("step '{step_id}' failed: {failure}")) {
            return e.into();
        }
        self.finish(&record).await;
        error!(run_id = %record.id, step_id, error = %failure, "workflow run aborted");

        EngineError::RunAborted {
            step_id: step_id.to_owned(),
            source: failure,
            record: Box::new(record),
        }
    }

    async fn persist_progress(&self, record: &ExecutionRecord) {
        if let Err(e) = self.store.update(record).await {
            warn!(run_id = %record.id, error = %e, "failed to persist run progress");
        }
    }

    /// Persist the finalized record and fold it into the workflow statistics.
    /// Neither failure changes the run's outcome.
    async fn finish(&self, record: &ExecutionRecord) {
        if let Err(e) = self.store.update(record).await {
            error!(run_id = %record.id, error = %e, "failed to persist finalized record");
        }

        let success = record.status == RunStatus::Completed;
        let duration_ms = record.duration_ms.unwrap_or_default();
        if let Err(e) = self.stats.record_run(record.workflow_id, success, duration_ms).await {
            warn!(workflow_id = %record.workflow_id, error = %e, "failed to update workflow statistics");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
