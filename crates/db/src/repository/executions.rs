//! Execution record repository functions.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::{ExecutionRow, ExecutionStatus}};

const EXECUTION_COLUMNS: &str =
    "id, workflow_id, workspace_id, status, record, started_at, finished_at";

/// Insert a new execution record.
pub async fn insert_execution(
    pool: &PgPool,
    id: Uuid,
    workflow_id: Uuid,
    workspace_id: &str,
    status: ExecutionStatus,
    record: serde_json::Value,
    started_at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_executions
            (id, workflow_id, workspace_id, status, record, started_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(workflow_id)
    .bind(workspace_id)
    .bind(status.to_string())
    .bind(record)
    .bind(started_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite an execution record that is still `running`.
///
/// Returns `DbError::NotFound` if the row is missing or already finalized.
pub async fn update_execution(
    pool: &PgPool,
    id: Uuid,
    status: ExecutionStatus,
    record: serde_json::Value,
    finished_at: Option<DateTime<Utc>>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_executions
        SET status = $2, record = $3, finished_at = $4
        WHERE id = $1 AND status = 'running'
        "#,
    )
    .bind(id)
    .bind(status.to_string())
    .bind(record)
    .bind(finished_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Fetch a single execution by its primary key.
pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<Option<ExecutionRow>, DbError> {
    let sql = format!("SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE id = $1");
    let row = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Most recent executions of a workflow, newest first.
pub async fn list_executions_for_workflow(
    pool: &PgPool,
    workflow_id: Uuid,
    limit: i64,
) -> Result<Vec<ExecutionRow>, DbError> {
    let sql = format!(
        r#"
        SELECT {EXECUTION_COLUMNS}
        FROM workflow_executions
        WHERE workflow_id = $1
        ORDER BY started_at DESC
        LIMIT $2
        "#
    );
    let rows = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
