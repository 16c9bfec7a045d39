/// Execution lifecycle types
///
/// Status state machine, per-run options, node telemetry and the terminal
/// result returned to callers, plus the durable record persisted through
/// an `ExecutionRepository`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// `Pending → Running → {Completed | Failed | Cancelled | Timeout}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "Pending",
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::Failed => "Failed",
            ExecutionStatus::Cancelled => "Cancelled",
            ExecutionStatus::Timeout => "Timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }

    /// Terminal states are final; only live executions move forward
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        match (self, next) {
            (ExecutionStatus::Pending, ExecutionStatus::Pending) => false,
            (ExecutionStatus::Pending, _) => true,
            (ExecutionStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ExecutionStatus::Pending),
            "Running" => Ok(ExecutionStatus::Running),
            "Completed" => Ok(ExecutionStatus::Completed),
            "Failed" => Ok(ExecutionStatus::Failed),
            "Cancelled" => Ok(ExecutionStatus::Cancelled),
            "Timeout" => Ok(ExecutionStatus::Timeout),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Per-run execution policy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Wall-clock limit for the whole run; `None` runs unbounded
    pub timeout: Option<Duration>,
    /// Tolerate node failures instead of aborting the run
    pub continue_on_error: bool,
    /// Run nodes of the same level concurrently
    pub enable_parallel_execution: bool,
}

/// Telemetry for one node run, accumulated across an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionSummary {
    pub node_id: String,
    pub node_type: String,
    pub node_name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal outcome returned by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Final workflow context
    pub output: Map<String, Value>,
    pub node_executions: Vec<NodeExecutionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub failed_nodes: Vec<String>,
    /// Nodes never run because their branch was not selected
    #[serde(default)]
    pub skipped_nodes: Vec<String>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub fn summary(&self, node_id: &str) -> Option<&NodeExecutionSummary> {
        self.node_executions.iter().find(|s| s.node_id == node_id)
    }
}

/// Durable execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub input: Value,
    pub output: Option<Value>,
    /// Short user-facing error summary
    pub error: Option<String>,
    /// Full captured error detail, kept server-side
    pub error_detail: Option<String>,
    pub node_executions: Vec<NodeExecutionSummary>,
}

impl ExecutionRecord {
    /// Fresh record for a run that is starting now
    pub fn running(id: impl Into<String>, workflow_id: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            input,
            output: None,
            error: None,
            error_detail: None,
            node_executions: Vec::new(),
        }
    }
}
