/// Graph construction and structural validation
///
/// Builds a `WorkflowGraph` from a decoded snapshot and checks it before any
/// node runs: empty graphs, missing start nodes, cycles and unreachable nodes
/// are all collected into a single validation error.

use crate::error::{EngineError, EngineResult};
use crate::graph::model::WorkflowGraph;
use crate::workflow::types::{EdgeDefinition, NodeDefinition};
use petgraph::visit::Bfs;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// How to treat workflows with more than one start node
///
/// Disconnected entry points are legitimate for parallel fan-in workflows
/// but are often an authoring mistake, so the behaviour is configurable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPolicy {
    /// Accept silently
    Allow,
    /// Accept and log a warning
    #[default]
    Warn,
    /// Report as a validation error
    Reject,
}

impl FromStr for EntryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(EntryPolicy::Allow),
            "warn" => Ok(EntryPolicy::Warn),
            "reject" => Ok(EntryPolicy::Reject),
            other => Err(format!("unknown entry policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder {
    entry_policy: EntryPolicy,
}

impl GraphBuilder {
    pub fn new(entry_policy: EntryPolicy) -> Self {
        Self { entry_policy }
    }

    /// Build a graph from flat node and edge lists
    ///
    /// Fails on the first duplicate node id or dangling edge reference.
    pub fn build_graph(
        &self,
        nodes: &[NodeDefinition],
        edges: &[EdgeDefinition],
    ) -> EngineResult<WorkflowGraph> {
        tracing::debug!("🏗️ Building workflow graph: {} nodes, {} edges", nodes.len(), edges.len());

        let mut graph = WorkflowGraph::new();
        for node in nodes {
            graph.add_node(node.clone().into())?;
        }
        for edge in edges {
            graph.add_edge(edge.clone().into())?;
        }
        Ok(graph)
    }

    /// Structural validation, run once before execution
    pub fn validate_graph(&self, graph: &WorkflowGraph) -> EngineResult<()> {
        if graph.is_empty() {
            return Err(EngineError::validation("Workflow has no nodes"));
        }

        let mut problems = Vec::new();

        let starts = graph.start_nodes();
        if starts.is_empty() {
            problems.push("Workflow has no start node (every node has an incoming edge)".to_string());
        } else if starts.len() > 1 {
            let ids: Vec<&str> = starts.iter().map(|n| n.id.as_str()).collect();
            match self.entry_policy {
                EntryPolicy::Allow => {}
                EntryPolicy::Warn => {
                    tracing::warn!("⚠️ Workflow has {} start nodes: {:?}", ids.len(), ids);
                }
                EntryPolicy::Reject => {
                    problems.push(format!("Workflow has multiple start nodes: {}", ids.join(", ")));
                }
            }
        }

        if let Some(node_id) = find_cycle(graph) {
            problems.push(format!("Workflow contains a cycle involving node '{}'", node_id));
        }

        for node_id in unreachable_nodes(graph) {
            problems.push(format!("Node '{}' is not reachable from any start node", node_id));
        }

        if problems.is_empty() {
            tracing::debug!("✅ Graph validation passed");
            Ok(())
        } else {
            tracing::error!("❌ Graph validation failed: {}", problems.join("; "));
            Err(EngineError::GraphValidation(problems))
        }
    }
}

/// Iterative DFS; any edge into a node still on the current path closes a
/// cycle. Returns the node the back edge points to.
fn find_cycle(graph: &WorkflowGraph) -> Option<String> {
    let inner = graph.inner();
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();

    for root in inner.node_indices() {
        if !visited.insert(root) {
            continue;
        }
        on_stack.insert(root);
        let mut stack = vec![(root, inner.neighbors_directed(root, Direction::Outgoing))];

        while let Some((idx, neighbors)) = stack.last_mut() {
            let idx = *idx;
            match neighbors.next() {
                Some(next) if on_stack.contains(&next) => return Some(inner[next].id.clone()),
                Some(next) => {
                    if visited.insert(next) {
                        on_stack.insert(next);
                        stack.push((next, inner.neighbors_directed(next, Direction::Outgoing)));
                    }
                }
                None => {
                    on_stack.remove(&idx);
                    stack.pop();
                }
            }
        }
    }
    None
}

/// Nodes not reachable along any path from a start node, in insertion order
fn unreachable_nodes(graph: &WorkflowGraph) -> Vec<String> {
    let inner = graph.inner();
    let mut reachable = HashSet::new();

    for start in graph.start_nodes() {
        let Some(idx) = graph.index_of(&start.id) else {
            continue;
        };
        let mut bfs = Bfs::new(inner, idx);
        while let Some(next) = bfs.next(inner) {
            reachable.insert(next);
        }
    }

    inner
        .node_indices()
        .filter(|idx| !reachable.contains(idx))
        .map(|idx| inner[idx].id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(ids: &[&str]) -> Vec<NodeDefinition> {
        ids.iter().map(|id| NodeDefinition::new(*id, "noop")).collect()
    }

    fn problems(result: EngineResult<()>) -> Vec<String> {
        match result {
            Err(EngineError::GraphValidation(p)) => p,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn linear_graph_is_valid() {
        let builder = GraphBuilder::default();
        let graph = builder
            .build_graph(
                &nodes(&["a", "b", "c"]),
                &[EdgeDefinition::new("a", "b"), EdgeDefinition::new("b", "c")],
            )
            .unwrap();
        assert!(builder.validate_graph(&graph).is_ok());
    }

    #[test]
    fn empty_graph_is_rejected() {
        let builder = GraphBuilder::default();
        let graph = builder.build_graph(&[], &[]).unwrap();
        let p = problems(builder.validate_graph(&graph));
        assert_eq!(p, vec!["Workflow has no nodes".to_string()]);
    }

    #[test]
    fn pure_cycle_reports_every_problem() {
        let builder = GraphBuilder::default();
        let graph = builder
            .build_graph(
                &nodes(&["a", "b"]),
                &[EdgeDefinition::new("a", "b"), EdgeDefinition::new("b", "a")],
            )
            .unwrap();
        let p = problems(builder.validate_graph(&graph));
        assert!(p.iter().any(|m| m.contains("no start node")));
        assert!(p.iter().any(|m| m.contains("cycle")));
        assert!(p.iter().any(|m| m.contains("'a' is not reachable")));
        assert!(p.iter().any(|m| m.contains("'b' is not reachable")));
    }

    #[test]
    fn cycle_behind_a_start_node_is_detected() {
        let builder = GraphBuilder::default();
        let graph = builder
            .build_graph(
                &nodes(&["start", "a", "b"]),
                &[
                    EdgeDefinition::new("start", "a"),
                    EdgeDefinition::new("a", "b"),
                    EdgeDefinition::new("b", "a"),
                ],
            )
            .unwrap();
        let p = problems(builder.validate_graph(&graph));
        assert_eq!(p.len(), 1);
        assert!(p[0].contains("cycle"));
    }

    #[test]
    fn very_long_chain_validates_without_deep_recursion() {
        let ids: Vec<String> = (0..100_000).map(|i| format!("n{i}")).collect();
        let defs: Vec<_> = ids.iter().map(|id| NodeDefinition::new(id.as_str(), "noop")).collect();
        let mut edges: Vec<_> = ids.windows(2).map(|w| EdgeDefinition::new(w[0].as_str(), w[1].as_str())).collect();

        let builder = GraphBuilder::default();
        let graph = builder.build_graph(&defs, &edges).unwrap();
        assert!(builder.validate_graph(&graph).is_ok());

        edges.push(EdgeDefinition::new("n99999", "n50000"));
        let graph = builder.build_graph(&defs, &edges).unwrap();
        let p = problems(builder.validate_graph(&graph));
        assert_eq!(p, vec!["Workflow contains a cycle involving node 'n50000'".to_string()]);
    }

    #[test]
    fn unreachable_island_is_flagged() {
        let builder = GraphBuilder::default();
        let graph = builder
            .build_graph(
                &nodes(&["start", "next", "x", "y"]),
                &[
                    EdgeDefinition::new("start", "next"),
                    EdgeDefinition::new("x", "y"),
                    EdgeDefinition::new("y", "x"),
                ],
            )
            .unwrap();
        let p = problems(builder.validate_graph(&graph));
        assert!(p.iter().any(|m| m.contains("'x' is not reachable")));
        assert!(p.iter().any(|m| m.contains("'y' is not reachable")));
    }

    #[test]
    fn multiple_start_nodes_follow_policy() {
        let defs = nodes(&["a", "b", "join"]);
        let edges = [EdgeDefinition::new("a", "join"), EdgeDefinition::new("b", "join")];

        let lenient = GraphBuilder::new(EntryPolicy::Warn);
        let graph = lenient.build_graph(&defs, &edges).unwrap();
        assert!(lenient.validate_graph(&graph).is_ok());

        let strict = GraphBuilder::new(EntryPolicy::Reject);
        let p = problems(strict.validate_graph(&graph));
        assert_eq!(p, vec!["Workflow has multiple start nodes: a, b".to_string()]);
    }

    #[test]
    fn entry_policy_parses_case_insensitively() {
        assert_eq!("Reject".parse::<EntryPolicy>().unwrap(), EntryPolicy::Reject);
        assert!("sometimes".parse::<EntryPolicy>().is_err());
    }
}
