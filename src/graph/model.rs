/// In-memory workflow graph
///
/// Wraps a petgraph `DiGraph` with a node-id index. Nodes are never removed,
/// so `NodeIndex` order is insertion order and doubles as the deterministic
/// tie-breaker for sorting.

use crate::error::{EdgeEnd, EngineError, EngineResult};
use crate::workflow::types::{EdgeDefinition, NodeDefinition, DEFAULT_PORT};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A node as the engine sees it. Immutable once added to a graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub node_type: String,
    pub name: String,
    pub parameters: Map<String, Value>,
    pub configuration: Map<String, Value>,
}

impl From<NodeDefinition> for GraphNode {
    fn from(def: NodeDefinition) -> Self {
        Self {
            id: def.id,
            node_type: def.node_type,
            name: def.name,
            parameters: def.parameters,
            configuration: def.configuration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub source: String,
    pub source_output: String,
    pub target: String,
    pub target_input: String,
}

impl GraphEdge {
    /// True when the edge is only followed for a specific selected output
    pub fn is_conditional(&self) -> bool {
        self.source_output != DEFAULT_PORT
    }
}

impl From<EdgeDefinition> for GraphEdge {
    fn from(def: EdgeDefinition) -> Self {
        Self {
            source: def.source_node_id,
            source_output: def.source_output,
            target: def.target_node_id,
            target_input: def.target_input,
        }
    }
}

/// Directed graph of workflow nodes, built fresh for every execution
#[derive(Debug, Default)]
pub struct WorkflowGraph {
    graph: DiGraph<GraphNode, GraphEdge>,
    /// Mapping from node ID to graph node index
    index: HashMap<String, NodeIndex>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: GraphNode) -> EngineResult<()> {
        if self.index.contains_key(&node.id) {
            return Err(EngineError::DuplicateNode(node.id));
        }
        let id = node.id.clone();
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        Ok(())
    }

    pub fn add_edge(&mut self, edge: GraphEdge) -> EngineResult<()> {
        let from = self.index_of(&edge.source).ok_or_else(|| EngineError::UnknownEdgeNode {
            end: EdgeEnd::Source,
            node_id: edge.source.clone(),
        })?;
        let to = self.index_of(&edge.target).ok_or_else(|| EngineError::UnknownEdgeNode {
            end: EdgeEnd::Target,
            node_id: edge.target.clone(),
        })?;
        self.graph.add_edge(from, to, edge);
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index_of(id).map(|idx| &self.graph[idx])
    }

    /// All nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> + '_ {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    /// All edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> + '_ {
        self.graph.edge_references().map(|e| e.weight())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn outgoing_edges(&self, id: &str) -> Vec<&GraphEdge> {
        self.edges_directed(id, Direction::Outgoing)
    }

    pub fn incoming_edges(&self, id: &str) -> Vec<&GraphEdge> {
        self.edges_directed(id, Direction::Incoming)
    }

    /// Nodes with zero incoming edges, in insertion order
    pub fn start_nodes(&self) -> Vec<&GraphNode> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| &self.graph[idx])
            .collect()
    }

    /// Insertion position of a node, used for deterministic ordering
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index_of(id).map(|idx| idx.index())
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub(crate) fn inner(&self) -> &DiGraph<GraphNode, GraphEdge> {
        &self.graph
    }

    /// petgraph yields adjacency in reverse insertion order; callers that
    /// merge data need the authored order, so edges are sorted by index.
    fn edges_directed(&self, id: &str, direction: Direction) -> Vec<&GraphEdge> {
        let Some(idx) = self.index_of(id) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self.graph.edges_directed(idx, direction).collect();
        edges.sort_by_key(|e| e.id().index());
        edges.into_iter().map(|e| e.weight()).collect()
    }
}
