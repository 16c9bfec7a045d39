/// Flowwright: graph-based workflow execution engine
///
/// Workflows are directed acyclic graphs of typed nodes. This library builds
/// and validates those graphs, orders them for sequential or level-parallel
/// execution, runs each node with retry/timeout/cancellation, and tracks
/// every run through a persisted execution record.

// Core configuration and setup
pub mod config;

// Engine error taxonomy
pub mod error;

// Workflow definitions and storage
pub mod workflow;

// Graph model, validation and ordering
pub mod graph;

// Node capability contract, registry and built-in nodes
pub mod nodes;

// Context, expressions, node executor and the execution engine
pub mod runtime;

// Execution status, results, records, repository and logger
pub mod execution;

// HTTP API layer - REST endpoints for workflows, executions and webhooks
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::{EngineError, EngineResult};
pub use execution::{ExecutionOptions, ExecutionResult, ExecutionStatus};
pub use graph::{GraphBuilder, WorkflowGraph};
pub use nodes::{Node, NodeContext, NodeExecutionResult, NodeRegistry};
pub use runtime::{NodeExecutor, WorkflowContext, WorkflowExecutionEngine};
pub use server::start_server;
pub use workflow::{EdgeDefinition, NodeDefinition, Workflow, WorkflowRecord};
