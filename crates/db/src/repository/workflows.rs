//! Workflow definition lookups and run statistics.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::WorkflowRow};

const WORKFLOW_COLUMNS: &str = "id, name, workspace_id, trigger_type, enabled, definition, \
     execution_count, success_count, failure_count, avg_duration_ms, last_run_at, created_at";

/// Insert or replace a workflow definition. Statistics columns are left
/// untouched on update.
///
/// `definition` must be a valid JSON object produced by serialising the
/// domain `WorkflowDefinition` type from the `engine` crate.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_workflow(
    pool: &PgPool,
    id: Uuid,
    name: &str,
    workspace_id: &str,
    trigger_type: &str,
    enabled: bool,
    definition: serde_json::Value,
    created_at: DateTime<Utc>,
) -> Result<WorkflowRow, DbError> {
    let sql = format!(
        r#"
        INSERT INTO workflows (id, name, workspace_id, trigger_type, enabled, definition, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name,
            workspace_id = EXCLUDED.workspace_id,
            trigger_type = EXCLUDED.trigger_type,
            enabled = EXCLUDED.enabled,
            definition = EXCLUDED.definition
        RETURNING {WORKFLOW_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, WorkflowRow>(&sql)
        .bind(id)
        .bind(name)
        .bind(workspace_id)
        .bind(trigger_type)
        .bind(enabled)
        .bind(definition)
        .bind(created_at)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Enabled workflows in `workspace_id` listening for `trigger_type`,
/// oldest first.
pub async fn find_enabled_by_trigger(
    pool: &PgPool,
    trigger_type: &str,
    workspace_id: &str,
) -> Result<Vec<WorkflowRow>, DbError> {
    let sql = format!(
        r#"
        SELECT {WORKFLOW_COLUMNS}
        FROM workflows
        WHERE enabled AND trigger_type = $1 AND workspace_id = $2
        ORDER BY created_at ASC
        "#
    );
    let rows = sqlx::query_as::<_, WorkflowRow>(&sql)
        .bind(trigger_type)
        .bind(workspace_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Fold one finished run into the workflow's statistics. The average is
/// updated in place so concurrent runs never lose a count.
///
/// Returns `DbError::NotFound` if the workflow does not exist.
pub async fn record_run_stats(
    pool: &PgPool,
    workflow_id: Uuid,
    success: bool,
    duration_ms: u64,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflows
        SET avg_duration_ms = (avg_duration_ms * execution_count + $2) / (execution_count + 1),
            execution_count = execution_count + 1,
            success_count = success_count + CASE WHEN $3 THEN 1 ELSE 0 END,
            failure_count = failure_count + CASE WHEN $3 THEN 0 ELSE 1 END,
            last_run_at = $4
        WHERE id = $1
        "#,
    )
    .bind(workflow_id)
    .bind(duration_ms as f64)
    .bind(success)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
