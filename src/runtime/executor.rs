/// Node executor
///
/// Runs one node to completion: resolves its capability from the registry,
/// evaluates templated parameters and input against the live context, then
/// applies the node's retry and timeout policy. Node errors never escape as
/// `Err`; only caller cancellation does.

use crate::config::NodeDefaults;
use crate::error::{EngineError, EngineResult};
use crate::graph::GraphNode;
use crate::nodes::{NodeContext, NodeExecutionResult, NodeRegistry, NodeServices};
use crate::runtime::context::WorkflowContext;
use crate::runtime::expression::ExpressionEvaluator;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-execution state every node run needs
#[derive(Clone)]
pub struct ExecutionScope {
    pub execution_id: String,
    pub workflow_id: String,
    pub context: Arc<WorkflowContext>,
    /// Caller cancellation; always wins over node work and retries
    pub cancellation: CancellationToken,
}

/// Effective retry/timeout policy for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Read `maxRetries`, `retryDelayMs` and `timeoutMs` overrides
    pub fn from_configuration(configuration: &Map<String, Value>, defaults: &NodeDefaults) -> Self {
        let max_retries = config_u64(configuration, "maxRetries")
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(defaults.max_retries);
        let retry_delay_ms = config_u64(configuration, "retryDelayMs").unwrap_or(defaults.retry_delay_ms);
        let timeout_ms = config_u64(configuration, "timeoutMs")
            .unwrap_or(defaults.timeout_ms)
            .max(defaults.min_timeout_ms);

        Self {
            max_retries,
            retry_delay: Duration::from_millis(retry_delay_ms),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Accepts numbers or numeric strings; negatives and garbage are ignored
fn config_u64(configuration: &Map<String, Value>, key: &str) -> Option<u64> {
    match configuration.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub struct NodeExecutor {
    registry: Arc<NodeRegistry>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    services: Arc<NodeServices>,
    defaults: NodeDefaults,
}

impl NodeExecutor {
    pub fn new(
        registry: Arc<NodeRegistry>,
        evaluator: Arc<dyn ExpressionEvaluator>,
        services: Arc<NodeServices>,
        defaults: NodeDefaults,
    ) -> Self {
        Self {
            registry,
            evaluator,
            services,
            defaults,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Execute a single node with the given input
    ///
    /// Returns the last attempt's result. `Err` is only returned when the
    /// caller's cancellation token fires.
    pub async fn execute_node(
        &self,
        node: &GraphNode,
        input: Map<String, Value>,
        scope: &ExecutionScope,
    ) -> EngineResult<NodeExecutionResult> {
        if scope.cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        tracing::debug!("🚀 Starting node execution: {} (type: {})", node.id, node.node_type);

        let Some(instance) = self.registry.create(&node.node_type) else {
            let err = EngineError::NodeNotRegistered(node.node_type.clone());
            tracing::error!("❌ Node '{}': {}", node.id, err);
            return Ok(NodeExecutionResult::failure(err.to_string()).with_metadata("fatal", json!(true)));
        };

        let snapshot = scope.context.snapshot();
        let resolved = self
            .evaluator
            .evaluate_parameters(&node.parameters, &snapshot)
            .and_then(|parameters| Ok((parameters, self.evaluator.evaluate_parameters(&input, &snapshot)?)));
        let (parameters, input) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                let err = EngineError::ExpressionEvaluation {
                    node_id: node.id.clone(),
                    message: e.to_string(),
                };
                tracing::error!("❌ {}", err);
                return Ok(NodeExecutionResult::failure(err.to_string()).with_metadata("fatal", json!(true)));
            }
        };

        let policy = RetryPolicy::from_configuration(&node.configuration, &self.defaults);
        let max_attempts = policy.max_attempts();
        let mut last = NodeExecutionResult::failure(format!("Node '{}' was never attempted", node.id));

        for attempt in 1..=max_attempts {
            let ctx = NodeContext {
                execution_id: scope.execution_id.clone(),
                workflow_id: scope.workflow_id.clone(),
                node_id: node.id.clone(),
                node_name: node.name.clone(),
                parameters: parameters.clone(),
                input: input.clone(),
                workflow_context: Arc::clone(&scope.context),
                cancellation: scope.cancellation.clone(),
                services: Arc::clone(&self.services),
            };

            let outcome = tokio::select! {
                biased;
                _ = scope.cancellation.cancelled() => {
                    tracing::warn!("⏹️ Node '{}' cancelled during attempt {}", node.id, attempt);
                    return Err(EngineError::Cancelled);
                }
                outcome = tokio::time::timeout(policy.timeout, instance.execute(ctx)) => outcome,
            };

            let result = match outcome {
                Ok(Ok(result)) => result.normalized(),
                Ok(Err(e)) => NodeExecutionResult::from_error(&e),
                Err(_) => NodeExecutionResult::failure(format!(
                    "Node '{}' timed out after {}ms",
                    node.id,
                    policy.timeout.as_millis()
                )),
            };

            if result.success {
                tracing::debug!("✅ Node '{}' succeeded on attempt {}/{}", node.id, attempt, max_attempts);
                return Ok(result.with_metadata("attempts", json!(attempt)));
            }

            tracing::warn!(
                "⚠️ Node '{}' attempt {}/{} failed: {}",
                node.id,
                attempt,
                max_attempts,
                result.error.as_deref().unwrap_or("unknown error")
            );
            last = result.with_metadata("attempts", json!(attempt));

            if attempt < max_attempts {
                tokio::select! {
                    biased;
                    _ = scope.cancellation.cancelled() => return Err(EngineError::Cancelled),
                    _ = tokio::time::sleep(policy.retry_delay) => {}
                }
            }
        }

        Ok(last)
    }
}
