/// Workflow execution engine
///
/// Drives one workflow run from `Running` to a terminal status: decodes the
/// stored snapshot, builds and validates a fresh graph, seeds the context,
/// then executes nodes sequentially in topological order or level by level
/// in parallel. Caller cancellation and the wall-clock timeout are raced
/// against the whole run; the final record is persisted in every case.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::execution::{
    ExecutionLogger, ExecutionOptions, ExecutionRecord, ExecutionRepository, ExecutionResult, ExecutionStatus,
    NodeExecutionSummary,
};
use crate::graph::{sort, GraphBuilder, GraphNode, WorkflowGraph};
use crate::nodes::NodeExecutionResult;
use crate::runtime::context::{create_workflow_context, input_for_node, update_with_node_output};
use crate::runtime::executor::{ExecutionScope, NodeExecutor};
use crate::workflow::types::{Workflow, WorkflowRecord};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How a run walks its graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Sequential,
    /// One entry per dependency level
    Parallel(Vec<Vec<String>>),
}

impl ExecutionStrategy {
    /// Parallel only when requested and some level holds more than one node
    pub fn choose(graph: &WorkflowGraph, options: &ExecutionOptions) -> Self {
        if !options.enable_parallel_execution {
            return ExecutionStrategy::Sequential;
        }
        match sort::parallel_groups(graph) {
            Ok(groups) if groups.iter().any(|group| group.len() > 1) => ExecutionStrategy::Parallel(groups),
            _ => ExecutionStrategy::Sequential,
        }
    }
}

/// Why a run stopped before walking the whole graph
#[derive(Debug)]
enum Halt {
    Failed { message: String, detail: Option<String> },
    Cancelled,
    TimedOut(Duration),
}

impl From<EngineError> for Halt {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Cancelled => Halt::Cancelled,
            EngineError::Timeout(limit) => Halt::TimedOut(limit),
            other => Halt::Failed {
                message: other.to_string(),
                detail: None,
            },
        }
    }
}

/// Mutable bookkeeping for one run; only the driving task writes to it
#[derive(Debug, Default)]
struct RunState {
    completed: HashSet<String>,
    summaries: Vec<NodeExecutionSummary>,
    failed: Vec<String>,
    skipped: Vec<String>,
}

pub struct WorkflowExecutionEngine {
    executor: Arc<NodeExecutor>,
    repository: Arc<dyn ExecutionRepository>,
    logger: Arc<dyn ExecutionLogger>,
    builder: GraphBuilder,
    /// Caps concurrently running nodes inside one parallel group of one run
    max_parallel_nodes: usize,
    /// Run tokens of executions still being driven by this process
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl WorkflowExecutionEngine {
    pub fn new(
        executor: Arc<NodeExecutor>,
        repository: Arc<dyn ExecutionRepository>,
        logger: Arc<dyn ExecutionLogger>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            executor,
            repository,
            logger,
            builder: GraphBuilder::new(config.entry_policy),
            max_parallel_nodes: config.max_parallel_nodes.max(1),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn executor(&self) -> &Arc<NodeExecutor> {
        &self.executor
    }

    /// Run a workflow to a terminal status
    ///
    /// Never fails: every problem (bad snapshot, invalid graph, node failure,
    /// cancellation, timeout) is reported through the returned result and the
    /// persisted record.
    pub async fn execute(
        &self,
        workflow: &WorkflowRecord,
        input: Option<Map<String, Value>>,
        options: ExecutionOptions,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let execution_id = Uuid::new_v4().to_string();
        let input = input.unwrap_or_default();
        let (record, run_token) = self.open(&execution_id, &workflow.id, &input, cancel.child_token()).await;
        self.run(record, workflow, input, options, run_token).await
    }

    /// Start a run in the background and return its execution id
    ///
    /// The `Running` record exists and the run is cancellable by the time
    /// this returns.
    pub async fn start(
        self: &Arc<Self>,
        workflow: WorkflowRecord,
        input: Option<Map<String, Value>>,
        options: ExecutionOptions,
    ) -> String {
        let execution_id = Uuid::new_v4().to_string();
        let input = input.unwrap_or_default();
        let (record, run_token) = self
            .open(&execution_id, &workflow.id, &input, CancellationToken::new())
            .await;

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run(record, &workflow, input, options, run_token).await;
        });
        execution_id
    }

    /// Request cancellation of a live execution
    pub async fn cancel_execution(&self, execution_id: &str) -> EngineResult<()> {
        let record = self
            .repository
            .get(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;

        if !record.status.can_transition_to(ExecutionStatus::Cancelled) {
            return Err(EngineError::InvalidStatusTransition {
                from: record.status,
                to: ExecutionStatus::Cancelled,
            });
        }

        let token = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(execution_id)
            .cloned();

        match token {
            Some(token) => {
                self.logger.log_info(execution_id, "⏹️ Cancellation requested");
                token.cancel();
            }
            None => {
                // Nothing in this process is driving the record (e.g. after a restart)
                let now = Utc::now();
                let expected = record.status;
                let mut record = record;
                record.status = ExecutionStatus::Cancelled;
                record.duration_ms = Some(elapsed_ms(record.started_at, now));
                record.finished_at = Some(now);
                record.error = Some(EngineError::Cancelled.to_string());

                if !self.repository.update_if_status(&record, expected).await? {
                    // The run finished between the status read and the token lookup
                    return Err(EngineError::InvalidStatusTransition {
                        from: self.get_execution_status(execution_id).await?,
                        to: ExecutionStatus::Cancelled,
                    });
                }
                self.logger.log_info(execution_id, "⏹️ Orphaned execution marked cancelled");
            }
        }
        Ok(())
    }

    /// Current status of an execution; idempotent
    pub async fn get_execution_status(&self, execution_id: &str) -> EngineResult<ExecutionStatus> {
        Ok(self.get_execution(execution_id).await?.status)
    }

    pub async fn get_execution(&self, execution_id: &str) -> EngineResult<ExecutionRecord> {
        self.repository
            .get(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))
    }

    pub async fn list_executions(&self, workflow_id: &str) -> EngineResult<Vec<ExecutionRecord>> {
        self.repository.list_for_workflow(workflow_id).await
    }

    /// Whether this process is still driving the execution
    pub fn is_active(&self, execution_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(execution_id)
    }

    /// Register the run token and persist the `Running` record
    async fn open(
        &self,
        execution_id: &str,
        workflow_id: &str,
        input: &Map<String, Value>,
        run_token: CancellationToken,
    ) -> (ExecutionRecord, CancellationToken) {
        // Registered before the record is visible so a cancel never sees it as orphaned
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(execution_id.to_string(), run_token.clone());

        let record = ExecutionRecord::running(execution_id, workflow_id, Value::Object(input.clone()));
        if let Err(e) = self.repository.create(&record).await {
            self.logger
                .log_error(execution_id, None, &format!("Failed to persist execution record: {e}"));
        }
        self.logger.log_execution_start(execution_id, workflow_id);
        (record, run_token)
    }

    async fn run(
        &self,
        mut record: ExecutionRecord,
        workflow: &WorkflowRecord,
        input: Map<String, Value>,
        options: ExecutionOptions,
        run_token: CancellationToken,
    ) -> ExecutionResult {
        let clock = Instant::now();
        let execution_id = record.id.clone();
        let context = Arc::new(create_workflow_context(&execution_id, &workflow.id, &workflow.name, Some(input)));
        let scope = ExecutionScope {
            execution_id: execution_id.clone(),
            workflow_id: workflow.id.clone(),
            context: Arc::clone(&context),
            cancellation: run_token.clone(),
        };
        let mut state = RunState::default();

        let outcome = match self.prepare(workflow) {
            Err(e) => Err(Halt::Failed {
                message: e.to_string(),
                detail: None,
            }),
            Ok(graph) => {
                let strategy = ExecutionStrategy::choose(&graph, &options);
                tracing::info!(
                    "🔄 Executing workflow '{}' ({} nodes, {})",
                    workflow.id,
                    graph.node_count(),
                    match &strategy {
                        ExecutionStrategy::Sequential => "sequential",
                        ExecutionStrategy::Parallel(_) => "parallel",
                    }
                );

                let deadline = async {
                    match options.timeout {
                        Some(limit) => {
                            tokio::time::sleep(limit).await;
                            limit
                        }
                        None => std::future::pending().await,
                    }
                };

                let outcome = tokio::select! {
                    biased;
                    _ = run_token.cancelled() => Err(Halt::Cancelled),
                    limit = deadline => Err(Halt::TimedOut(limit)),
                    outcome = self.drive(&graph, &strategy, &scope, &options, &mut state) => outcome,
                };
                if matches!(outcome, Err(Halt::TimedOut(_))) {
                    run_token.cancel();
                }
                outcome
            }
        };

        let (status, error, detail) = match outcome {
            Ok(()) => (ExecutionStatus::Completed, None, None),
            Err(Halt::Failed { message, detail }) => (ExecutionStatus::Failed, Some(message), detail),
            Err(Halt::Cancelled) => (ExecutionStatus::Cancelled, Some(EngineError::Cancelled.to_string()), None),
            Err(Halt::TimedOut(limit)) => (
                ExecutionStatus::Timeout,
                Some(EngineError::Timeout(limit).to_string()),
                None,
            ),
        };
        if let Some(message) = &error {
            self.logger.log_error(&execution_id, None, message);
        }

        let finished_at = Utc::now();
        let duration_ms = clock.elapsed().as_millis() as u64;
        let output = context.snapshot();

        record.status = status;
        record.finished_at = Some(finished_at);
        record.duration_ms = Some(duration_ms);
        record.output = Some(Value::Object(output.clone()));
        record.error = error.clone();
        record.error_detail = detail;
        record.node_executions = state.summaries.clone();
        match self.repository.update_if_status(&record, ExecutionStatus::Running).await {
            Ok(true) => {}
            Ok(false) => self.logger.log_error(
                &execution_id,
                None,
                "Execution record was already finished; result not persisted",
            ),
            Err(e) => self
                .logger
                .log_error(&execution_id, None, &format!("Failed to persist execution result: {e}")),
        }
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&execution_id);

        let result = ExecutionResult {
            execution_id,
            workflow_id: workflow.id.clone(),
            status,
            started_at: record.started_at,
            finished_at,
            duration_ms,
            output,
            node_executions: state.summaries,
            error,
            failed_nodes: state.failed,
            skipped_nodes: state.skipped,
        };
        self.logger.log_execution_complete(&result);
        result
    }

    /// Structural check for a definition before it is stored
    pub fn validate_workflow(&self, workflow: &Workflow) -> EngineResult<()> {
        let graph = self.builder.build_graph(&workflow.nodes, &workflow.edges)?;
        self.builder.validate_graph(&graph)
    }

    /// Decode, build and validate the graph for one run
    fn prepare(&self, workflow: &WorkflowRecord) -> EngineResult<WorkflowGraph> {
        let (nodes, edges) = workflow.snapshot()?;
        if nodes.is_empty() {
            return Err(EngineError::validation("Workflow has no nodes"));
        }
        let graph = self.builder.build_graph(&nodes, &edges)?;
        self.builder.validate_graph(&graph)?;
        Ok(graph)
    }

    async fn drive(
        &self,
        graph: &WorkflowGraph,
        strategy: &ExecutionStrategy,
        scope: &ExecutionScope,
        options: &ExecutionOptions,
        state: &mut RunState,
    ) -> Result<(), Halt> {
        match strategy {
            ExecutionStrategy::Sequential => self.drive_sequential(graph, scope, options, state).await,
            ExecutionStrategy::Parallel(groups) => self.drive_parallel(graph, groups, scope, options, state).await,
        }
    }

    async fn drive_sequential(
        &self,
        graph: &WorkflowGraph,
        scope: &ExecutionScope,
        options: &ExecutionOptions,
        state: &mut RunState,
    ) -> Result<(), Halt> {
        for node_id in sort::sort(graph)? {
            if !sort::is_executable(graph, &node_id, &state.completed, &scope.context) {
                self.skip(scope, node_id, state);
                continue;
            }
            let Some(node) = graph.node(&node_id) else {
                continue;
            };

            let input = input_for_node(&scope.context, &graph.incoming_edges(&node_id));
            let (result, summary) = run_node(&self.executor, node, input, scope).await?;
            self.absorb(scope, node, result, summary, options, state)?;
        }
        Ok(())
    }

    async fn drive_parallel(
        &self,
        graph: &WorkflowGraph,
        groups: &[Vec<String>],
        scope: &ExecutionScope,
        options: &ExecutionOptions,
        state: &mut RunState,
    ) -> Result<(), Halt> {
        for (level, group) in groups.iter().enumerate() {
            let mut runnable = Vec::with_capacity(group.len());
            for node_id in group {
                if sort::is_executable(graph, node_id, &state.completed, &scope.context) {
                    runnable.push(node_id.clone());
                } else {
                    self.skip(scope, node_id.clone(), state);
                }
            }
            if runnable.is_empty() {
                continue;
            }
            tracing::debug!("⚡ Level {}: running {} node(s) concurrently", level, runnable.len());

            let limit = Arc::new(Semaphore::new(self.max_parallel_nodes));
            let mut tasks = JoinSet::new();
            for node_id in &runnable {
                let Some(node) = graph.node(node_id).cloned() else {
                    continue;
                };
                let input = input_for_node(&scope.context, &graph.incoming_edges(node_id));
                let executor = Arc::clone(&self.executor);
                let limit = Arc::clone(&limit);
                let scope = scope.clone();

                tasks.spawn(async move {
                    let _permit = limit.acquire_owned().await.ok();
                    let outcome = run_node(&executor, &node, input, &scope).await;
                    (node.id, outcome)
                });
            }

            let mut finished = HashMap::with_capacity(runnable.len());
            let mut lost = None;
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((node_id, outcome)) => {
                        finished.insert(node_id, outcome);
                    }
                    Err(e) => lost = Some(e.to_string()),
                }
            }

            // Merge in group order so the context is written by one task only
            let mut halt = None;
            for node_id in &runnable {
                let Some(node) = graph.node(node_id) else {
                    continue;
                };
                let (result, summary) = match finished.remove(node_id) {
                    Some(Ok(done)) => done,
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        let result = NodeExecutionResult::failure(format!(
                            "Node '{}' task ended unexpectedly: {}",
                            node_id,
                            lost.as_deref().unwrap_or("aborted")
                        ));
                        let now = Utc::now();
                        let summary = summarize(node, &result, now, now);
                        (result, summary)
                    }
                };
                if let Err(stop) = self.absorb(scope, node, result, summary, options, state) {
                    halt.get_or_insert(stop);
                }
            }
            if let Some(stop) = halt {
                return Err(stop);
            }
        }
        Ok(())
    }

    /// Fold one node's result into the run
    ///
    /// Failures abort the run unless `continue_on_error` is set, in which
    /// case the node counts as completed so its dependents still run.
    fn absorb(
        &self,
        scope: &ExecutionScope,
        node: &GraphNode,
        result: NodeExecutionResult,
        summary: NodeExecutionSummary,
        options: &ExecutionOptions,
        state: &mut RunState,
    ) -> Result<(), Halt> {
        self.logger.log_node_execution(&scope.execution_id, &summary);
        state.summaries.push(summary);
        update_with_node_output(&scope.context, &node.id, &result);

        if result.success {
            state.completed.insert(node.id.clone());
            return Ok(());
        }

        let error = result.error.as_deref().unwrap_or("unknown error");
        state.failed.push(node.id.clone());
        self.logger.log_error(&scope.execution_id, Some(node.id.as_str()), error);

        if options.continue_on_error {
            state.completed.insert(node.id.clone());
            return Ok(());
        }
        Err(Halt::Failed {
            message: format!("Node '{}' failed: {}", node.id, error),
            detail: result.exception,
        })
    }

    fn skip(&self, scope: &ExecutionScope, node_id: String, state: &mut RunState) {
        tracing::debug!("⏭️ Skipping node '{}' (branch not taken or dependency not completed)", node_id);
        self.logger
            .log_info(&scope.execution_id, &format!("⏭️ Node '{node_id}' skipped"));
        state.skipped.push(node_id);
    }
}

/// Execute one node and build its summary
async fn run_node(
    executor: &NodeExecutor,
    node: &GraphNode,
    input: Map<String, Value>,
    scope: &ExecutionScope,
) -> EngineResult<(NodeExecutionResult, NodeExecutionSummary)> {
    let started_at = Utc::now();
    let result = executor.execute_node(node, input, scope).await?;
    let summary = summarize(node, &result, started_at, Utc::now());
    Ok((result, summary))
}

fn summarize(
    node: &GraphNode,
    result: &NodeExecutionResult,
    started_at: chrono::DateTime<Utc>,
    finished_at: chrono::DateTime<Utc>,
) -> NodeExecutionSummary {
    NodeExecutionSummary {
        node_id: node.id.clone(),
        node_type: node.node_type.clone(),
        node_name: node.name.clone(),
        success: result.success,
        duration_ms: elapsed_ms(started_at, finished_at),
        started_at,
        finished_at,
        error: result.error.clone(),
    }
}

fn elapsed_ms(from: chrono::DateTime<Utc>, to: chrono::DateTime<Utc>) -> u64 {
    (to - from).num_milliseconds().max(0) as u64
}
