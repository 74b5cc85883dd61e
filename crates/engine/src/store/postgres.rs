//! Postgres-backed store on top of the `db` repository functions.

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use db::models::ExecutionStatus;
use db::{DbError, DbPool, repository};

use super::{DefinitionSource, ExecutionStore, StatsSink};
use crate::error::StoreError;
use crate::models::WorkflowDefinition;
use crate::record::{ExecutionRecord, RunStatus};

fn row_status(status: RunStatus) -> ExecutionStatus {
    match status {
        RunStatus::Running => ExecutionStatus::Running,
        RunStatus::Completed => ExecutionStatus::Completed,
        RunStatus::Failed => ExecutionStatus::Failed,
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or replace a definition, keyed by its id.
    pub async fn save_definition(&self, definition: &WorkflowDefinition) -> Result<(), StoreError> {
        repository::workflows::upsert_workflow(
            &self.pool,
            definition.id,
            &definition.name,
            &definition.workspace_id,
            &definition.trigger.trigger_type,
            definition.enabled,
            serde_json::to_value(definition)?,
            definition.created_at,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for PgStore {
    async fn insert(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        repository::executions::insert_execution(
            &self.pool,
            record.id,
            record.workflow_id,
            &record.workspace_id,
            row_status(record.status),
            serde_json::to_value(record)?,
            record.started_at,
        )
        .await?;
        Ok(())
    }

    async fn update(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let result = repository::executions::update_execution(
            &self.pool,
            record.id,
            row_status(record.status),
            serde_json::to_value(record)?,
            record.finished_at,
        )
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(DbError::NotFound) => Err(StoreError::NotWritable(record.id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionRecord>, StoreError> {
        match repository::executions::get_execution(&self.pool, id).await? {
            Some(row) => Ok(Some(serde_json::from_value(row.record)?)),
            None => Ok(None),
        }
    }

    async fn list_for_workflow(
        &self,
        workflow_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows = repository::executions::list_executions_for_workflow(
            &self.pool,
            workflow_id,
            i64::try_from(limit).unwrap_or(i64::MAX),
        )
        .await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row.record).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl StatsSink for PgStore {
    async fn record_run(
        &self,
        workflow_id: Uuid,
        success: bool,
        duration_ms: u64,
    ) -> Result<(), StoreError> {
        repository::workflows::record_run_stats(&self.pool, workflow_id, success, duration_ms)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DefinitionSource for PgStore {
    async fn find_by_trigger(
        &self,
        trigger_type: &str,
        workspace_id: &str,
    ) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let rows =
            repository::workflows::find_enabled_by_trigger(&self.pool, trigger_type, workspace_id)
                .await?;

        let mut definitions = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<WorkflowDefinition>(row.definition) {
                Ok(definition) => definitions.push(definition),
                // Skip unreadable rows; the rest of the trigger still fires.
                Err(e) => warn!(workflow_id = %row.id, error = %e, "skipping unreadable workflow definition"),
            }
        }
        Ok(definitions)
    }
}
