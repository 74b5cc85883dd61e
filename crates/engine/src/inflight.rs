//! Registry of runs currently executing in this process.
//!
//! Entries are removed when the [`RunGuard`] returned by [`RunRegistry::track`]
//! drops, so an aborted or panicking run never lingers here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::record::ExecutionRecord;

/// A point-in-time view of one in-flight run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub workspace_id: String,
    pub trigger_type: String,
    pub started_at: DateTime<Utc>,
    pub current_step: Option<String>,
    pub completed_steps: u32,
    pub total_steps: u32,
}

impl RunSnapshot {
    fn of(record: &ExecutionRecord, current_step: Option<String>) -> Self {
        Self {
            run_id: record.id,
            workflow_id: record.workflow_id,
            workflow_name: record.workflow_name.clone(),
            workspace_id: record.workspace_id.clone(),
            trigger_type: record.trigger.trigger_type.clone(),
            started_at: record.started_at,
            current_step,
            completed_steps: record.metrics.settled(),
            total_steps: record.metrics.total_steps,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    runs: Arc<DashMap<Uuid, RunSnapshot>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a run. Keep the guard alive for the run's duration.
    pub fn track(&self, record: &ExecutionRecord) -> RunGuard {
        self.runs.insert(record.id, RunSnapshot::of(record, None));
        RunGuard {
            run_id: record.id,
            runs: Arc::clone(&self.runs),
        }
    }

    /// Refresh the snapshot of a tracked run. Untracked runs are ignored.
    pub fn update(&self, record: &ExecutionRecord, current_step: Option<&str>) {
        if let Some(mut entry) = self.runs.get_mut(&record.id) {
            *entry = RunSnapshot::of(record, current_step.map(str::to_owned));
        }
    }

    /// All in-flight runs, oldest first.
    pub fn list(&self) -> Vec<RunSnapshot> {
        let mut runs: Vec<RunSnapshot> = self.runs.iter().map(|e| e.value().clone()).collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }

    pub fn get(&self, run_id: &Uuid) -> Option<RunSnapshot> {
        self.runs.get(run_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Removes its run from the registry on drop.
#[derive(Debug)]
pub struct RunGuard {
    run_id: Uuid,
    runs: Arc<DashMap<Uuid, RunSnapshot>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runs.remove(&self.run_id);
    }
}
