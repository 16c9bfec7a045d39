/// Execution status and cancellation endpoints

use crate::api::{ApiError, AppState};
use crate::execution::ExecutionRecord;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

pub fn create_execution_routes() -> Router<AppState> {
    Router::new()
        .route("/api/executions/{id}", get(get_execution))
        .route("/api/executions/{id}/status", get(get_execution_status))
        .route("/api/executions/{id}/cancel", post(cancel_execution))
}

/// GET /api/executions/{id}
async fn get_execution(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<ExecutionRecord>, ApiError> {
    Ok(Json(state.engine.get_execution(&id).await?))
}

/// GET /api/executions/{id}/status
async fn get_execution_status(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let status = state.engine.get_execution_status(&id).await?;
    Ok(Json(json!({ "executionId": id, "status": status })))
}

/// POST /api/executions/{id}/cancel
///
/// 202 once cancellation is requested, 404 for unknown ids, 409 when the
/// execution already reached a terminal status.
async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.engine.cancel_execution(&id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "executionId": id, "message": "Cancellation requested" })),
    ))
}
