//! Trigger dispatcher: fans one business event out to every matching
//! workflow definition.
//!
//! Each matching definition runs as its own task, so a slow `wait` in one
//! workflow never holds back another. A run that fails is logged here and
//! its record is still returned; it never stops sibling runs.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::conditions::conditions_match;
use crate::error::EngineError;
use crate::executor::WorkflowExecutor;
use crate::models::TriggerEvent;
use crate::record::ExecutionRecord;
use crate::store::DefinitionSource;

#[derive(Clone)]
pub struct TriggerDispatcher {
    executor: Arc<WorkflowExecutor>,
    definitions: Arc<dyn DefinitionSource>,
}

impl TriggerDispatcher {
    pub fn new(executor: Arc<WorkflowExecutor>, definitions: Arc<dyn DefinitionSource>) -> Self {
        Self {
            executor,
            definitions,
        }
    }

    pub fn executor(&self) -> &Arc<WorkflowExecutor> {
        &self.executor
    }

    /// Start every enabled workflow in `workspace_id` that listens for
    /// `trigger_type` and whose conditions hold against `payload`.
    ///
    /// Returns one record per run that got as far as opening a record,
    /// in definition order. Only a failure to look up definitions is an
    /// error.
    #[instrument(skip(self, payload))]
    pub async fn dispatch(
        &self,
        trigger_type: &str,
        payload: Value,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<Vec<ExecutionRecord>, EngineError> {
        let candidates = self
            .definitions
            .find_by_trigger(trigger_type, workspace_id)
            .await?;

        let mut runs = JoinSet::new();
        for (order, definition) in candidates.into_iter().enumerate() {
            if !definition.enabled
                || definition.trigger.trigger_type != trigger_type
                || definition.workspace_id != workspace_id
            {
                continue;
            }
            if !conditions_match(&definition.conditions, &payload) {
                info!(workflow_id = %definition.id, "conditions not met, workflow skipped");
                continue;
            }

            let executor = Arc::clone(&self.executor);
            let event = TriggerEvent::new(trigger_type, payload.clone());
            let user_id = user_id.to_owned();
            runs.spawn(async move {
                let outcome = executor.execute(&definition, event, &user_id).await;
                (order, definition.id, outcome)
            });
        }

        let mut records = Vec::with_capacity(runs.len());
        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok((order, _, Ok(record))) => records.push((order, record)),
                Ok((order, workflow_id, Err(err))) => {
                    error!(%workflow_id, error = %err, "workflow run failed");
                    if let Some(record) = err.into_record() {
                        records.push((order, record));
                    }
                }
                Err(join_err) => warn!(error = %join_err, "workflow run task panicked"),
            }
        }

        records.sort_by_key(|(order, _)| *order);
        info!(trigger_type, runs = records.len(), "trigger dispatched");
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }
}
