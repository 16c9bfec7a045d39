/// Workflow Graph Layer
///
/// In-memory DAG model, construction/validation and ordering:
/// - Graph model backed by petgraph with id lookups
/// - Builder with aggregated structural validation
/// - Topological sort, level grouping and readiness queries

// Graph model: nodes, edges, adjacency
pub mod model;

// Construction and validation
pub mod builder;

// Kahn ordering, parallel levels, executable-node queries
pub mod sort;

pub use builder::{EntryPolicy, GraphBuilder};
pub use model::{GraphEdge, GraphNode, WorkflowGraph};
