/// Workflow snapshot types
///
/// Defines the boundary format for workflows: node and edge definitions as
/// they are authored and stored. The persisted record keeps both lists as
/// JSON text; the engine decodes that snapshot at the start of every run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Port name used when an edge does not name a specific output or input
pub const DEFAULT_PORT: &str = "default";

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

/// A single node as authored in the workflow editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    /// Unique node identifier within the workflow (e.g., "trigger", "fetch-user")
    pub id: String,
    /// Registered capability type (e.g., "http-request", "if-condition")
    #[serde(rename = "type")]
    pub node_type: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Capability parameters, may contain `{{ ... }}` templates
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Execution overrides: maxRetries, retryDelayMs, timeoutMs
    #[serde(default)]
    pub configuration: Map<String, Value>,
    /// Canvas position, carried through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Connection between two node ports
///
/// Data flows from `source_output` of the source node into `target_input`
/// of the target node. A non-default `source_output` makes the edge
/// conditional: it is only followed when the source selects that port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDefinition {
    pub source_node_id: String,
    #[serde(default = "default_port")]
    pub source_output: String,
    pub target_node_id: String,
    #[serde(default = "default_port")]
    pub target_input: String,
}

impl EdgeDefinition {
    /// Plain data edge between default ports
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_node_id: source.into(),
            source_output: default_port(),
            target_node_id: target.into(),
            target_input: default_port(),
        }
    }

    /// Edge followed only when the source selects `output`
    pub fn conditional(
        source: impl Into<String>,
        output: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source_output: output.into(),
            ..Self::new(source, target)
        }
    }
}

/// Persisted workflow record
///
/// Nodes and edges are stored JSON-encoded, exactly as they are written to
/// the `workflows` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: String,
    pub name: String,
    /// JSON array of `NodeDefinition`
    pub nodes: String,
    /// JSON array of `EdgeDefinition`
    pub edges: String,
}

impl WorkflowRecord {
    /// Decode the node/edge snapshot. Blank columns decode as empty lists.
    pub fn snapshot(&self) -> Result<(Vec<NodeDefinition>, Vec<EdgeDefinition>), serde_json::Error> {
        let nodes = if self.nodes.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.nodes)?
        };
        let edges = if self.edges.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&self.edges)?
        };
        Ok((nodes, edges))
    }
}

/// Decoded workflow as exchanged over the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier (e.g., "wf-onboarding")
    pub id: String,
    /// Human-readable workflow name
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default, alias = "connections")]
    pub edges: Vec<EdgeDefinition>,
}

impl Workflow {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        nodes: Vec<NodeDefinition>,
        edges: Vec<EdgeDefinition>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes,
            edges,
        }
    }

    /// Encode into the persisted record format
    pub fn to_record(&self) -> Result<WorkflowRecord, serde_json::Error> {
        Ok(WorkflowRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            nodes: serde_json::to_string(&self.nodes)?,
            edges: serde_json::to_string(&self.edges)?,
        })
    }

    pub fn from_record(record: &WorkflowRecord) -> Result<Self, serde_json::Error> {
        let (nodes, edges) = record.snapshot()?;
        Ok(Self {
            id: record.id.clone(),
            name: record.name.clone(),
            nodes,
            edges,
        })
    }
}

impl NodeDefinition {
    /// Minimal node with empty parameters and configuration
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type: node_type.into(),
            parameters: Map::new(),
            configuration: Map::new(),
            position: None,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_configuration(mut self, key: impl Into<String>, value: Value) -> Self {
        self.configuration.insert(key.into(), value);
        self
    }
}
