/// Node Capability Layer
///
/// Every node type implements the same `Node` trait and is created through the
/// `NodeRegistry` by its type identifier. The engine never inspects what a
/// node does; it only sees a `NodeExecutionResult`.

// Type -> factory registry with lock-free reads
pub mod registry;

// Built-in trigger, assignment, branching and HTTP nodes
pub mod builtin;

use crate::runtime::context::WorkflowContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use registry::{NodeFactory, NodeRegistry};

/// A unit of work in a workflow
///
/// Errors returned from `execute` are captured by the node executor into a
/// failed result and may be retried according to the node configuration.
#[async_trait]
pub trait Node: Send + Sync {
    async fn execute(&self, ctx: NodeContext) -> anyhow::Result<NodeExecutionResult>;
}

/// Shared dependencies available to node implementations
#[derive(Debug, Clone, Default)]
pub struct NodeServices {
    /// Pooled HTTP client for request nodes
    pub http: reqwest::Client,
}

/// Everything a node sees for one attempt
#[derive(Clone)]
pub struct NodeContext {
    pub execution_id: String,
    pub workflow_id: String,
    pub node_id: String,
    pub node_name: String,
    /// Parameters with every template already resolved
    pub parameters: Map<String, Value>,
    /// Input computed from upstream outputs (or the workflow input)
    pub input: Map<String, Value>,
    /// Live workflow context, read-only from a node's point of view
    pub workflow_context: Arc<WorkflowContext>,
    /// Fires on caller cancellation
    pub cancellation: CancellationToken,
    pub services: Arc<NodeServices>,
}

/// Outcome of one node execution
///
/// `success == false` always carries an error message; use the
/// constructors, or `normalized()` on results built by hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Debug rendering of the captured error chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    /// Output port chosen by a branching node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_output: Option<String>,
}

impl NodeExecutionResult {
    pub fn success(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            data,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Failed result carrying the full error chain
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self {
            exception: Some(format!("{:?}", error)),
            ..Self::failure(error.to_string())
        }
    }

    pub fn with_selected_output(mut self, port: impl Into<String>) -> Self {
        self.selected_output = Some(port.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.get_or_insert_with(Map::new).insert(key.into(), value);
        self
    }

    /// Enforce that failures carry an error message
    pub fn normalized(mut self) -> Self {
        if !self.success && self.error.as_deref().map_or(true, str::is_empty) {
            self.error = Some("Node reported failure without an error message".to_string());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_always_has_error() {
        let raw = NodeExecutionResult {
            success: false,
            ..Default::default()
        };
        assert!(raw.normalized().error.is_some());

        let ok = NodeExecutionResult::success(Map::new()).normalized();
        assert!(ok.error.is_none());
    }

    #[test]
    fn from_error_keeps_chain() {
        let err = anyhow::anyhow!("socket closed").context("request failed");
        let result = NodeExecutionResult::from_error(&err);
        assert_eq!(result.error.as_deref(), Some("request failed"));
        assert!(result.exception.unwrap().contains("socket closed"));
    }

    #[test]
    fn serializes_camel_case() {
        let result = NodeExecutionResult::success(Map::new())
            .with_selected_output("true")
            .with_metadata("attempts", json!(1));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["selectedOutput"], json!("true"));
        assert_eq!(value["metadata"]["attempts"], json!(1));
        assert!(value.get("error").is_none());
    }
}
