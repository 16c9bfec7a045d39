/// Execution logger
///
/// Append-only sink for lifecycle events. The default implementation emits
/// structured tracing events; deployments can plug in their own.

use crate::execution::types::{ExecutionResult, NodeExecutionSummary};

pub trait ExecutionLogger: Send + Sync {
    fn log_execution_start(&self, execution_id: &str, workflow_id: &str);
    fn log_execution_complete(&self, result: &ExecutionResult);
    fn log_node_execution(&self, execution_id: &str, summary: &NodeExecutionSummary);
    fn log_error(&self, execution_id: &str, node_id: Option<&str>, message: &str);
    fn log_info(&self, execution_id: &str, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingExecutionLogger;

impl ExecutionLogger for TracingExecutionLogger {
    fn log_execution_start(&self, execution_id: &str, workflow_id: &str) {
        tracing::info!(execution_id, workflow_id, "🚀 Starting workflow execution");
    }

    fn log_execution_complete(&self, result: &ExecutionResult) {
        if result.is_success() {
            tracing::info!(
                execution_id = %result.execution_id,
                status = %result.status,
                duration_ms = result.duration_ms,
                nodes = result.node_executions.len(),
                "🎉 Workflow execution finished"
            );
        } else {
            tracing::warn!(
                execution_id = %result.execution_id,
                status = %result.status,
                duration_ms = result.duration_ms,
                error = result.error.as_deref().unwrap_or(""),
                "⏹️ Workflow execution finished"
            );
        }
    }

    fn log_node_execution(&self, execution_id: &str, summary: &NodeExecutionSummary) {
        if summary.success {
            tracing::info!(
                execution_id,
                node_id = %summary.node_id,
                node_type = %summary.node_type,
                duration_ms = summary.duration_ms,
                "✅ Node completed"
            );
        } else {
            tracing::warn!(
                execution_id,
                node_id = %summary.node_id,
                node_type = %summary.node_type,
                duration_ms = summary.duration_ms,
                error = summary.error.as_deref().unwrap_or(""),
                "❌ Node failed"
            );
        }
    }

    fn log_error(&self, execution_id: &str, node_id: Option<&str>, message: &str) {
        tracing::error!(execution_id, node_id = node_id.unwrap_or(""), "❌ {}", message);
    }

    fn log_info(&self, execution_id: &str, message: &str) {
        tracing::info!(execution_id, "{}", message);
    }
}
