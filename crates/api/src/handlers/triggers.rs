use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use tracing::error;

use crate::AppState;
use engine::ExecutionRecord;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub workspace_id: String,
    pub user_id: String,
    #[serde(default)]
    pub payload: Value,
}

/// Fire a business event. Responds once every matching run has finished,
/// with one record per run (failed runs included).
pub async fn fire(
    Path(trigger_type): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<Vec<ExecutionRecord>>, StatusCode> {
    if request.workspace_id.trim().is_empty() || request.user_id.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state
        .dispatcher
        .dispatch(&trigger_type, request.payload, &request.workspace_id, &request.user_id)
        .await
    {
        Ok(records) => Ok(Json(records)),
        Err(e) => {
            error!(%trigger_type, error = %e, "trigger dispatch failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
