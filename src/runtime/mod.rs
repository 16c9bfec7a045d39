/// Runtime Execution Layer
///
/// Everything that happens while a workflow runs:
/// - Workflow context creation and node input computation
/// - Template expression evaluation for node parameters
/// - Per-node execution with retry, timeout and cancellation
/// - The workflow execution engine (sequential and parallel strategies)

// Shared per-execution context and its factory functions
pub mod context;

// `{{ ... }}` templates resolved against the context
pub mod expression;

// Single-node runs: retries, timeouts, cancellation
pub mod executor;

// Run lifecycle and strategy selection
pub mod engine;

pub use context::WorkflowContext;
pub use engine::{ExecutionStrategy, WorkflowExecutionEngine};
pub use executor::{ExecutionScope, NodeExecutor, RetryPolicy};
pub use expression::{ExpressionError, ExpressionEvaluator, TemplateEvaluator};
