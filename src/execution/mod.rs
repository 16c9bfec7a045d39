/// Execution Records Layer
///
/// Status state machine, options and results for workflow runs, plus the
/// collaborators that persist and log them:
/// - Execution types (status, options, summaries, results, records)
/// - Execution repository (in-memory and SQLite)
/// - Execution logger (tracing-backed by default)

pub mod types;

pub mod repository;

pub mod logger;

pub use logger::{ExecutionLogger, TracingExecutionLogger};
pub use repository::{ExecutionRepository, InMemoryExecutionRepository, SqliteExecutionRepository};
pub use types::{
    ExecutionOptions, ExecutionRecord, ExecutionResult, ExecutionStatus, NodeExecutionSummary,
};
