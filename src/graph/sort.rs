/// Topological ordering and parallel grouping
///
/// `sort` is Kahn's algorithm with ties broken by insertion order, so the
/// same workflow always runs in the same sequence. `parallel_groups` buckets
/// nodes by dependency depth for concurrent execution.

use crate::error::{EngineError, EngineResult};
use crate::graph::model::WorkflowGraph;
use crate::runtime::context::WorkflowContext;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Total execution order over every node
///
/// Fails with a graph validation error when a cycle prevents some nodes
/// from ever reaching in-degree zero.
pub fn sort(graph: &WorkflowGraph) -> EngineResult<Vec<String>> {
    let inner = graph.inner();
    let mut in_degree: Vec<usize> = inner
        .node_indices()
        .map(|idx| inner.edges_directed(idx, Direction::Incoming).count())
        .collect();

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(pos, _)| pos)
        .collect();

    let mut order = Vec::with_capacity(inner.node_count());
    while let Some(pos) = ready.pop_first() {
        let idx = NodeIndex::new(pos);
        order.push(inner[idx].id.clone());
        for edge in inner.edges_directed(idx, Direction::Outgoing) {
            let target = edge.target().index();
            in_degree[target] -= 1;
            if in_degree[target] == 0 {
                ready.insert(target);
            }
        }
    }

    if order.len() < inner.node_count() {
        return Err(EngineError::validation(format!(
            "Workflow contains a cycle: only {} of {} nodes could be ordered",
            order.len(),
            inner.node_count()
        )));
    }

    Ok(order)
}

/// Dependency depth of every node
///
/// Start nodes sit at level 0; every other node sits one level below its
/// deepest direct predecessor.
pub fn node_levels(graph: &WorkflowGraph) -> EngineResult<HashMap<String, usize>> {
    let order = sort(graph)?;
    let mut levels: HashMap<String, usize> = HashMap::with_capacity(order.len());

    for id in &order {
        let level = graph
            .incoming_edges(id)
            .iter()
            .filter_map(|edge| levels.get(&edge.source))
            .max()
            .map_or(0, |deepest| deepest + 1);
        levels.insert(id.clone(), level);
    }

    Ok(levels)
}

/// Nodes grouped by level; members of one group may run concurrently
pub fn parallel_groups(graph: &WorkflowGraph) -> EngineResult<Vec<Vec<String>>> {
    let levels = node_levels(graph)?;
    let depth = levels.values().copied().max().map_or(0, |max| max + 1);
    let mut groups = vec![Vec::new(); depth];

    for node in graph.nodes() {
        if let Some(&level) = levels.get(&node.id) {
            groups[level].push(node.id.clone());
        }
    }

    Ok(groups)
}

/// Whether a node may start now
///
/// Every incoming edge's source must be completed, and every conditional
/// edge must match the output its source selected. A node that fails the
/// branch check never becomes executable for this run.
pub fn is_executable(
    graph: &WorkflowGraph,
    node_id: &str,
    completed: &HashSet<String>,
    context: &WorkflowContext,
) -> bool {
    graph.incoming_edges(node_id).iter().all(|edge| {
        if !completed.contains(&edge.source) {
            return false;
        }
        if !edge.is_conditional() {
            return true;
        }
        context.selected_output(&edge.source).as_deref() == Some(edge.source_output.as_str())
    })
}

/// Every not-yet-completed node that may start now, in insertion order
pub fn executable_nodes(
    graph: &WorkflowGraph,
    completed: &HashSet<String>,
    context: &WorkflowContext,
) -> Vec<String> {
    graph
        .nodes()
        .filter(|node| !completed.contains(&node.id))
        .filter(|node| is_executable(graph, &node.id, completed, context))
        .map(|node| node.id.clone())
        .collect()
}
