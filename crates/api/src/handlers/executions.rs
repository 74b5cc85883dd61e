use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::error;
use uuid::Uuid;

use crate::AppState;
use engine::{ExecutionRecord, RunSnapshot};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, serde::Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

pub async fn in_flight(State(state): State<AppState>) -> Json<Vec<RunSnapshot>> {
    Json(state.dispatcher.executor().in_flight().list())
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ExecutionRecord>, StatusCode> {
    match state.store.get(id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(execution_id = %id, error = %e, "failed to load execution");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn list_for_workflow(
    Path(workflow_id): Path<Uuid>,
    Query(params): Query<ListParams>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ExecutionRecord>>, StatusCode> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    match state.store.list_for_workflow(workflow_id, limit).await {
        Ok(records) => Ok(Json(records)),
        Err(e) => {
            error!(%workflow_id, error = %e, "failed to list executions");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
