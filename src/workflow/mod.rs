/// Workflow Management Layer
///
/// Workflow definitions as authored and stored:
/// - Type definitions (Workflow, NodeDefinition, EdgeDefinition, WorkflowRecord)
/// - SQLite persistence with sqlx

// Core workflow type definitions
pub mod types;

// SQLite persistence layer for workflow storage
pub mod storage;

// Re-export commonly used types
pub use storage::{WorkflowMetadata, WorkflowStorage};
pub use types::{EdgeDefinition, NodeDefinition, Position, Workflow, WorkflowRecord};
