//! Persistence seams for the engine: execution records, workflow
//! statistics, and the definitions the dispatcher selects from.
//!
//! [`InMemoryStore`] backs tests and definition-directory deployments;
//! [`PgStore`] backs the server.

mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::WorkflowDefinition;
use crate::record::ExecutionRecord;

pub use postgres::PgStore;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persist a freshly opened record. Fails if the id already exists.
    async fn insert(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    /// Overwrite a stored record. Fails if the stored copy is missing or
    /// already finalized.
    async fn update(&self, record: &ExecutionRecord) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionRecord>, StoreError>;

    /// Newest first.
    async fn list_for_workflow(
        &self,
        workflow_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, StoreError>;
}

#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn record_run(
        &self,
        workflow_id: Uuid,
        success: bool,
        duration_ms: u64,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Enabled definitions in `workspace_id` listening for `trigger_type`.
    async fn find_by_trigger(
        &self,
        trigger_type: &str,
        workspace_id: &str,
    ) -> Result<Vec<WorkflowDefinition>, StoreError>;
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStats {
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_duration_ms: f64,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl WorkflowStats {
    /// Fold one run into the running totals.
    pub fn record(&mut self, success: bool, duration_ms: u64) {
        let previous = self.execution_count as f64;
        self.execution_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.avg_duration_ms =
            (self.avg_duration_ms * previous + duration_ms as f64) / self.execution_count as f64;
        self.last_run_at = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryStore {
    definitions: RwLock<Vec<WorkflowDefinition>>,
    records: RwLock<HashMap<Uuid, ExecutionRecord>>,
    stats: RwLock<HashMap<Uuid, WorkflowStats>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definitions(definitions: Vec<WorkflowDefinition>) -> Self {
        Self {
            definitions: RwLock::new(definitions),
            ..Self::default()
        }
    }

    pub async fn add_definition(&self, definition: WorkflowDefinition) {
        self.definitions.write().await.push(definition);
    }

    pub async fn stats(&self, workflow_id: Uuid) -> Option<WorkflowStats> {
        self.stats.read().await.get(&workflow_id).cloned()
    }

    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn insert(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &ExecutionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(stored) if !stored.is_finalized() => {
                *stored = record.clone();
                Ok(())
            }
            _ => Err(StoreError::NotWritable(record.id)),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list_for_workflow(
        &self,
        workflow_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let records = self.records.read().await;
        let mut matching: Vec<ExecutionRecord> = records
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching.truncate(limit);
        Ok(matching)
    }
}

#[async_trait]
impl StatsSink for InMemoryStore {
    async fn record_run(
        &self,
        workflow_id: Uuid,
        success: bool,
        duration_ms: u64,
    ) -> Result<(), StoreError> {
        self.stats
            .write()
            .await
            .entry(workflow_id)
            .or_default()
            .record(success, duration_ms);
        Ok(())
    }
}

#[async_trait]
impl DefinitionSource for InMemoryStore {
    async fn find_by_trigger(
        &self,
        trigger_type: &str,
        workspace_id: &str,
    ) -> Result<Vec<WorkflowDefinition>, StoreError> {
        Ok(self
            .definitions
            .read()
            .await
            .iter()
            .filter(|d| {
                d.enabled
                    && d.trigger.trigger_type == trigger_type
                    && d.workspace_id == workspace_id
            })
            .cloned()
            .collect())
    }
}
