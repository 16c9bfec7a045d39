/// HTTP API Layer
///
/// REST endpoints for workflow management and execution control:
/// - Workflow CRUD operations
/// - Synchronous and background execution, status lookup, cancellation
/// - Webhook triggers that run a workflow with the request body as input

// Workflow management and execution-start endpoints
pub mod workflows;

// Execution status and cancellation endpoints
pub mod executions;

// Webhook execution endpoints
pub mod webhooks;

use crate::error::EngineError;
use crate::execution::ExecutionOptions;
use crate::runtime::WorkflowExecutionEngine;
use crate::workflow::storage::WorkflowStorage;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::sync::Arc;

// Re-export router builders
pub use executions::create_execution_routes;
pub use webhooks::create_webhook_routes;
pub use workflows::create_workflow_routes;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Workflow storage for persistence
    pub storage: WorkflowStorage,
    /// Execution engine shared by every route
    pub engine: Arc<WorkflowExecutionEngine>,
    /// Options applied when a request does not override them
    pub default_options: ExecutionOptions,
}

/// Error response carrying a status code and a JSON `{"error": ...}` body
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::ExecutionNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
            EngineError::GraphValidation(_)
            | EngineError::DuplicateNode(_)
            | EngineError::UnknownEdgeNode { .. }
            | EngineError::ExpressionEvaluation { .. }
            | EngineError::NodeNotRegistered(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Serialization(_) => StatusCode::BAD_REQUEST,
            EngineError::Cancelled | EngineError::Timeout(_) | EngineError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("❌ {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
