/// Engine error taxonomy
///
/// Graph validation, expression evaluation, cancellation/timeout and
/// execution-record lookups all surface through `EngineError`. Node
/// capabilities themselves return `anyhow` errors which the node executor
/// captures into failed results.

use crate::execution::ExecutionStatus;
use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Which end of an edge referenced a missing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeEnd {
    Source,
    Target,
}

impl std::fmt::Display for EdgeEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeEnd::Source => f.write_str("source"),
            EdgeEnd::Target => f.write_str("target"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Every structural problem found in a graph, reported together.
    #[error("graph validation failed: {}", .0.join("; "))]
    GraphValidation(Vec<String>),

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("edge {end} references unknown node: {node_id}")]
    UnknownEdgeNode { end: EdgeEnd, node_id: String },

    /// Template/expression resolution failed for a node's parameters or input.
    #[error("expression evaluation failed for node '{node_id}': {message}")]
    ExpressionEvaluation { node_id: String, message: String },

    #[error("no node registered for type '{0}'")]
    NodeNotRegistered(String),

    #[error("execution cancelled")]
    Cancelled,

    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("cannot transition execution from {from} to {to}")]
    InvalidStatusTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// Snapshot decoding or payload encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Convenience constructor for a single validation problem.
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::GraphValidation(vec![message.into()])
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}
