/// Webhook execution endpoints
///
/// Runs a stored workflow with the request body as its input. Any method
/// and any sub-path are accepted; both are passed through to the workflow.

use crate::api::{workflows::load_record, ApiError, AppState};
use crate::execution::ExecutionResult;
use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::Json,
    routing::{any, Router},
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub fn create_webhook_routes() -> Router<AppState> {
    Router::new()
        // Format: /webhook/{workflow_id}/{webhook_path}
        .route("/webhook/{workflow_id}/{*path}", any(execute_webhook))
}

/// Build the workflow input from a webhook request
///
/// Object bodies are used as-is, other JSON values are wrapped under
/// `body`, and an empty body yields an empty object.
pub fn webhook_input(method: &Method, path: &str, body: &str) -> Result<Map<String, Value>, ApiError> {
    let mut input = if body.trim().is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                let mut wrapped = Map::new();
                wrapped.insert("body".to_string(), other);
                wrapped
            }
            Err(e) => {
                tracing::warn!("❌ Invalid JSON payload for webhook {}: {}", path, e);
                return Err(ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid JSON payload: {e}")));
            }
        }
    };
    input.insert("webhookPath".to_string(), json!(path));
    input.insert("method".to_string(), json!(method.as_str()));
    Ok(input)
}

/// ANY /webhook/{workflow_id}/{*path}
async fn execute_webhook(
    State(state): State<AppState>,
    Path((workflow_id, webhook_path)): Path<(String, String)>,
    method: Method,
    body: String,
) -> Result<Json<ExecutionResult>, ApiError> {
    tracing::info!("📥 Webhook request received: {}/{}", workflow_id, webhook_path);
    tracing::debug!("📄 Request body: {}", body);

    let input = webhook_input(&method, &webhook_path, &body)?;
    let record = load_record(&state, &workflow_id).await?;
    let options = state.default_options.clone();

    let engine = Arc::clone(&state.engine);
    let run = tokio::spawn(async move { engine.execute(&record, Some(input), options, CancellationToken::new()).await });
    let result = run
        .await
        .map_err(|e| ApiError::internal(format!("Webhook execution task failed: {e}")))?;

    tracing::info!("✅ Webhook execution {} finished: {}", result.execution_id, result.status);
    Ok(Json(result))
}
