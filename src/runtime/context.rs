/// Workflow context and its factory functions
///
/// The context is the one map every node of an execution shares:
/// - `$execution`: identifiers and start time
/// - `$input`: the initial input (empty object when none was given)
/// - `$node.<id>`: written once per node after it runs
///
/// Writes take an exclusive lock; readers never observe a half-written entry.

use crate::graph::GraphEdge;
use crate::nodes::NodeExecutionResult;
use serde_json::{json, Map, Value};
use std::sync::{PoisonError, RwLock};

pub const EXECUTION_KEY: &str = "$execution";
pub const INPUT_KEY: &str = "$input";
pub const NODE_KEY_PREFIX: &str = "$node.";

/// Context key under which a node's record is stored
pub fn node_key(node_id: &str) -> String {
    format!("{}{}", NODE_KEY_PREFIX, node_id)
}

/// Shared, append-only key/value state for one execution
#[derive(Debug, Default)]
pub struct WorkflowContext {
    entries: RwLock<Map<String, Value>>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key that has not been written yet
    ///
    /// Returns false (and leaves the existing value) when the key is taken.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&key) {
            tracing::warn!("⚠️ Context key '{}' already written, ignoring new value", key);
            return false;
        }
        entries.insert(key, value);
        true
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Point-in-time copy of the whole context
    pub fn snapshot(&self) -> Map<String, Value> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The initial workflow input
    pub fn input(&self) -> Map<String, Value> {
        self.get(INPUT_KEY)
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default()
    }

    /// Output data recorded for a node, if it has run
    pub fn node_data(&self, node_id: &str) -> Option<Map<String, Value>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&node_key(node_id))
            .and_then(|record| record.get("data"))
            .and_then(Value::as_object)
            .cloned()
    }

    /// Output port a branching node selected, if any
    pub fn selected_output(&self, node_id: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(&node_key(node_id))
            .and_then(|record| record.get("selectedOutput"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Shorthand for `update_with_node_output`
    pub fn record_node_output(&self, node_id: &str, result: &NodeExecutionResult) {
        update_with_node_output(self, node_id, result);
    }
}

/// Seed a fresh context for one execution
pub fn create_workflow_context(
    execution_id: &str,
    workflow_id: &str,
    workflow_name: &str,
    input: Option<Map<String, Value>>,
) -> WorkflowContext {
    let context = WorkflowContext::new();
    context.insert(
        EXECUTION_KEY,
        json!({
            "executionId": execution_id,
            "workflowId": workflow_id,
            "workflowName": workflow_name,
            "startedAt": chrono::Utc::now().to_rfc3339(),
        }),
    );
    context.insert(INPUT_KEY, Value::Object(input.unwrap_or_default()));
    context
}

/// Compute a node's effective input from its incoming edges
///
/// Start nodes receive the full workflow input. Otherwise each edge in
/// authored order contributes the source's output: default ports merge the
/// whole output map (later edges win), named ports copy that field into the
/// edge's target input key. A branch port whose name is not a data field
/// carries the whole output, so nodes behind an if-condition see its data.
pub fn input_for_node(context: &WorkflowContext, incoming: &[&GraphEdge]) -> Map<String, Value> {
    if incoming.is_empty() {
        return context.input();
    }

    let mut input = Map::new();
    for edge in incoming {
        let Some(data) = context.node_data(&edge.source) else {
            continue;
        };

        if !edge.is_conditional() {
            input.extend(data);
        } else if let Some(field) = data.get(&edge.source_output) {
            input.insert(edge.target_input.clone(), field.clone());
        } else if context.selected_output(&edge.source).as_deref() == Some(edge.source_output.as_str()) {
            input.extend(data);
        }
    }
    input
}

/// Record a node's result under `$node.<id>`
pub fn update_with_node_output(context: &WorkflowContext, node_id: &str, result: &NodeExecutionResult) {
    let mut record = Map::new();
    record.insert("success".to_string(), Value::Bool(result.success));
    record.insert("data".to_string(), Value::Object(result.data.clone()));
    record.insert("executedAt".to_string(), json!(chrono::Utc::now().to_rfc3339()));
    if let Some(error) = &result.error {
        record.insert("error".to_string(), json!(error));
    }
    if let Some(metadata) = &result.metadata {
        record.insert("metadata".to_string(), Value::Object(metadata.clone()));
    }
    if let Some(port) = &result.selected_output {
        record.insert("selectedOutput".to_string(), json!(port));
    }
    context.insert(node_key(node_id), Value::Object(record));
}
