/// Workflow management REST API endpoints
///
/// CRUD operations for workflow definitions plus the endpoints that start
/// executions. Definitions are validated as graphs before they are stored.

use crate::api::{ApiError, AppState};
use crate::execution::{ExecutionOptions, ExecutionRecord, ExecutionResult};
use crate::workflow::types::{Workflow, WorkflowRecord};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Response for workflow creation/update operations
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub id: String,
    pub message: String,
}

/// Request body for workflow creation
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub workflow: Workflow,
}

/// Request body for starting an execution; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub input: Option<Map<String, Value>>,
    #[serde(default)]
    pub options: RunOptions,
}

/// Per-request overrides of the engine's default options
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    /// 0 disables the wall-clock limit
    pub timeout_ms: Option<u64>,
    pub continue_on_error: Option<bool>,
    pub enable_parallel_execution: Option<bool>,
}

impl RunOptions {
    pub fn apply(&self, mut options: ExecutionOptions) -> ExecutionOptions {
        if let Some(ms) = self.timeout_ms {
            options.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(flag) = self.continue_on_error {
            options.continue_on_error = flag;
        }
        if let Some(flag) = self.enable_parallel_execution {
            options.enable_parallel_execution = flag;
        }
        options
    }
}

impl ExecuteRequest {
    /// Parse a request body, treating an empty body as "no overrides"
    pub fn parse(body: &str) -> Result<Self, ApiError> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(body)
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid execution request: {e}")))
    }
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workflows", post(create_workflow).get(list_workflows))
        .route(
            "/api/workflows/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
        .route("/api/workflows/{id}/execute", post(execute_workflow))
        .route("/api/workflows/{id}/start", post(start_workflow))
        .route("/api/workflows/{id}/executions", get(list_workflow_executions))
}

/// Create a new workflow
///
/// POST /api/workflows
/// Body: { "workflow": { "id": "...", "name": "...", "nodes": [...], "edges": [...] } }
async fn create_workflow(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<WorkflowResponse>), ApiError> {
    let workflow = payload.workflow;

    if workflow.id.is_empty() || workflow.name.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Workflow id and name are required"));
    }

    match state.storage.get_record(&workflow.id).await {
        Ok(Some(_)) => {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                format!("Workflow '{}' already exists", workflow.id),
            ))
        }
        Ok(None) => {}
        Err(e) => return Err(ApiError::internal(format!("Failed to look up workflow: {e}"))),
    }

    state.engine.validate_workflow(&workflow)?;
    state
        .storage
        .save_workflow(&workflow)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to save workflow: {e}")))?;

    tracing::info!("🔥 Created workflow: {} ({})", workflow.id, workflow.name);

    Ok((
        StatusCode::CREATED,
        Json(WorkflowResponse {
            id: workflow.id.clone(),
            message: format!("Workflow '{}' created successfully", workflow.name),
        }),
    ))
}

/// List all workflows
///
/// GET /api/workflows
async fn list_workflows(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let workflows = state
        .storage
        .list_workflows()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list workflows: {e}")))?;
    Ok(Json(json!({ "workflows": workflows })))
}

/// Get a specific workflow by ID
///
/// GET /api/workflows/{id}
async fn get_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Workflow>, ApiError> {
    match state.storage.get_workflow(&id).await {
        Ok(Some(workflow)) => Ok(Json(workflow)),
        Ok(None) => Err(ApiError::not_found(format!("Workflow '{id}' not found"))),
        Err(e) => Err(ApiError::internal(format!("Failed to get workflow {id}: {e}"))),
    }
}

/// Update an existing workflow
///
/// PUT /api/workflows/{id}
async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, ApiError> {
    let mut workflow = payload.workflow;
    workflow.id = id.clone();

    if workflow.name.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Workflow name is required"));
    }

    load_record(&state, &id).await?;
    state.engine.validate_workflow(&workflow)?;
    state
        .storage
        .save_workflow(&workflow)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update workflow: {e}")))?;

    tracing::info!("🔥 Updated workflow: {} ({})", workflow.id, workflow.name);

    Ok(Json(WorkflowResponse {
        id: workflow.id.clone(),
        message: format!("Workflow '{}' updated successfully", workflow.name),
    }))
}

/// Delete a workflow
///
/// DELETE /api/workflows/{id}
async fn delete_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    match state.storage.delete_workflow(&id).await {
        Ok(true) => {
            tracing::info!("🗑️ Deleted workflow: {}", id);
            Ok(Json(json!({ "message": "Workflow deleted successfully" })))
        }
        Ok(false) => Err(ApiError::not_found(format!("Workflow '{id}' not found"))),
        Err(e) => Err(ApiError::internal(format!("Failed to delete workflow: {e}"))),
    }
}

/// Run a workflow and wait for its terminal result
///
/// POST /api/workflows/{id}/execute
/// Body: { "input": {...}, "options": { "timeoutMs": 0, "continueOnError": false, "enableParallelExecution": false } }
async fn execute_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> Result<Json<ExecutionResult>, ApiError> {
    let request = ExecuteRequest::parse(&body)?;
    let record = load_record(&state, &id).await?;
    let options = request.options.apply(state.default_options.clone());

    tracing::info!("📥 Execution requested for workflow: {}", id);

    // Run detached so a dropped connection cannot abandon a half-finished run
    let engine = Arc::clone(&state.engine);
    let run = tokio::spawn(async move {
        engine
            .execute(&record, request.input, options, CancellationToken::new())
            .await
    });
    let result = run
        .await
        .map_err(|e| ApiError::internal(format!("Execution task failed: {e}")))?;

    Ok(Json(result))
}

/// Start a workflow in the background
///
/// POST /api/workflows/{id}/start
/// Returns 202 with `{ "executionId": "..." }`
async fn start_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: String,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request = ExecuteRequest::parse(&body)?;
    let record = load_record(&state, &id).await?;
    let options = request.options.apply(state.default_options.clone());

    let execution_id = state.engine.start(record, request.input, options).await;
    tracing::info!("🚀 Started execution {} for workflow {}", execution_id, id);

    Ok((StatusCode::ACCEPTED, Json(json!({ "executionId": execution_id }))))
}

/// Execution history for one workflow, newest first
///
/// GET /api/workflows/{id}/executions
async fn list_workflow_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ExecutionRecord>>, ApiError> {
    Ok(Json(state.engine.list_executions(&id).await?))
}

pub(crate) async fn load_record(state: &AppState, id: &str) -> Result<WorkflowRecord, ApiError> {
    match state.storage.get_record(id).await {
        Ok(Some(record)) => Ok(record),
        Ok(None) => Err(ApiError::not_found(format!("Workflow '{id}' not found"))),
        Err(e) => Err(ApiError::internal(format!("Failed to load workflow {id}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_means_defaults() {
        let request = ExecuteRequest::parse("  ").unwrap();
        assert!(request.input.is_none());
        let defaults = ExecutionOptions {
            timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        assert_eq!(request.options.apply(defaults.clone()), defaults);
    }

    #[test]
    fn overrides_replace_defaults() {
        let request = ExecuteRequest::parse(
            r#"{"input": {"n": 1}, "options": {"timeoutMs": 0, "continueOnError": true, "enableParallelExecution": true}}"#,
        )
        .unwrap();
        let defaults = ExecutionOptions {
            timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let options = request.options.apply(defaults);
        assert_eq!(options.timeout, None);
        assert!(options.continue_on_error);
        assert!(options.enable_parallel_execution);
        assert_eq!(request.input.unwrap()["n"], json!(1));
    }

    #[test]
    fn malformed_body_is_a_bad_request() {
        let err = ExecuteRequest::parse("{nope").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
