use async_trait::async_trait;
use flowwright::config::{EngineConfig, NodeDefaults};
use flowwright::error::{EngineError, EngineResult};
use flowwright::execution::{
    ExecutionLogger, ExecutionOptions, ExecutionRecord, ExecutionRepository, ExecutionResult, ExecutionStatus,
    InMemoryExecutionRepository, NodeExecutionSummary, TracingExecutionLogger,
};
use flowwright::nodes::{Node, NodeContext, NodeExecutionResult, NodeRegistry, NodeServices};
use flowwright::runtime::{NodeExecutor, TemplateEvaluator, WorkflowExecutionEngine};
use flowwright::workflow::{EdgeDefinition, NodeDefinition, Workflow, WorkflowRecord};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Always fails with a fixed message
struct FailNode;

#[async_trait]
impl Node for FailNode {
    async fn execute(&self, _ctx: NodeContext) -> anyhow::Result<NodeExecutionResult> {
        anyhow::bail!("downstream service unavailable")
    }
}

/// Sleeps for `ms`, tracking how many sleepers overlap
struct SleepNode {
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl Node for SleepNode {
    async fn execute(&self, ctx: NodeContext) -> anyhow::Result<NodeExecutionResult> {
        let ms = ctx.parameters.get("ms").and_then(Value::as_u64).unwrap_or(100);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        let mut data = ctx.input;
        data.insert(ctx.node_id.clone(), json!(ms));
        Ok(NodeExecutionResult::success(data))
    }
}

/// Captures every lifecycle event it receives
#[derive(Default)]
struct RecordingLogger {
    events: Mutex<Vec<String>>,
}

impl RecordingLogger {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ExecutionLogger for RecordingLogger {
    fn log_execution_start(&self, _execution_id: &str, workflow_id: &str) {
        self.events.lock().unwrap().push(format!("start:{workflow_id}"));
    }
    fn log_execution_complete(&self, result: &ExecutionResult) {
        self.events.lock().unwrap().push(format!("complete:{}", result.status));
    }
    fn log_node_execution(&self, _execution_id: &str, summary: &NodeExecutionSummary) {
        self.events.lock().unwrap().push(format!("node:{}:{}", summary.node_id, summary.success));
    }
    fn log_error(&self, _execution_id: &str, _node_id: Option<&str>, _message: &str) {
        self.events.lock().unwrap().push("error".to_string());
    }
    fn log_info(&self, _execution_id: &str, _message: &str) {}
}

/// Delays every `get` after reading, so a caller acts on a stale status
struct SlowReads {
    inner: Arc<InMemoryExecutionRepository>,
    delay: Duration,
}

#[async_trait]
impl ExecutionRepository for SlowReads {
    async fn create(&self, record: &ExecutionRecord) -> EngineResult<()> {
        self.inner.create(record).await
    }
    async fn update(&self, record: &ExecutionRecord) -> EngineResult<()> {
        self.inner.update(record).await
    }
    async fn update_if_status(&self, record: &ExecutionRecord, expected: ExecutionStatus) -> EngineResult<bool> {
        self.inner.update_if_status(record, expected).await
    }
    async fn get(&self, id: &str) -> EngineResult<Option<ExecutionRecord>> {
        let record = self.inner.get(id).await?;
        tokio::time::sleep(self.delay).await;
        Ok(record)
    }
    async fn list_for_workflow(&self, workflow_id: &str) -> EngineResult<Vec<ExecutionRecord>> {
        self.inner.list_for_workflow(workflow_id).await
    }
}

struct Harness {
    engine: Arc<WorkflowExecutionEngine>,
    repository: Arc<InMemoryExecutionRepository>,
    peak: Arc<AtomicUsize>,
}

fn harness_on(
    logger: Arc<dyn ExecutionLogger>,
    services: NodeServices,
    config: EngineConfig,
    read_delay: Option<Duration>,
) -> Harness {
    let registry = NodeRegistry::with_builtins();
    registry.register("fail", || FailNode);

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
    registry.register("sleep", move || SleepNode {
        running: Arc::clone(&r),
        peak: Arc::clone(&p),
    });

    let executor = NodeExecutor::new(
        Arc::new(registry),
        Arc::new(TemplateEvaluator),
        Arc::new(services),
        NodeDefaults::default(),
    );
    let repository = Arc::new(InMemoryExecutionRepository::new());
    let store: Arc<dyn ExecutionRepository> = match read_delay {
        Some(delay) => Arc::new(SlowReads {
            inner: Arc::clone(&repository),
            delay,
        }),
        None => Arc::clone(&repository) as Arc<dyn ExecutionRepository>,
    };
    let engine = WorkflowExecutionEngine::new(Arc::new(executor), store, logger, &config);

    Harness {
        engine: Arc::new(engine),
        repository,
        peak,
    }
}

fn harness_with(logger: Arc<dyn ExecutionLogger>, services: NodeServices) -> Harness {
    harness_on(logger, services, EngineConfig::default(), None)
}

fn harness() -> Harness {
    harness_with(Arc::new(TracingExecutionLogger), NodeServices::default())
}

fn workflow(nodes: Vec<NodeDefinition>, edges: Vec<EdgeDefinition>) -> WorkflowRecord {
    Workflow::new("wf-test", "Test workflow", nodes, edges)
        .to_record()
        .unwrap()
}

fn input(value: Value) -> Option<Map<String, Value>> {
    value.as_object().cloned()
}

fn set(id: &str, key: &str, value: Value) -> NodeDefinition {
    NodeDefinition::new(id, "set-variable")
        .with_parameter("name", json!(key))
        .with_parameter("value", value)
}

fn sleep(id: &str, ms: u64) -> NodeDefinition {
    NodeDefinition::new(id, "sleep").with_parameter("ms", json!(ms))
}

async fn run(h: &Harness, wf: &WorkflowRecord, input: Option<Map<String, Value>>, options: ExecutionOptions) -> ExecutionResult {
    h.engine.execute(wf, input, options, CancellationToken::new()).await
}

fn continue_on_error() -> ExecutionOptions {
    ExecutionOptions {
        continue_on_error: true,
        ..Default::default()
    }
}

fn parallel() -> ExecutionOptions {
    ExecutionOptions {
        enable_parallel_execution: true,
        ..Default::default()
    }
}

/// start fans out to a failing node and a sleeper, both feeding `join`
fn failing_fan_out() -> WorkflowRecord {
    workflow(
        vec![
            NodeDefinition::new("start", "manual-trigger"),
            NodeDefinition::new("broken", "fail"),
            sleep("slow", 100),
            set("join", "joined", json!(true)),
        ],
        vec![
            EdgeDefinition::new("start", "broken"),
            EdgeDefinition::new("start", "slow"),
            EdgeDefinition::new("broken", "join"),
            EdgeDefinition::new("slow", "join"),
        ],
    )
}

fn node_order(result: &ExecutionResult) -> Vec<&str> {
    result.node_executions.iter().map(|s| s.node_id.as_str()).collect()
}

#[tokio::test]
async fn linear_workflow_completes_in_order() {
    let h = harness();
    let wf = workflow(
        vec![
            NodeDefinition::new("start", "manual-trigger"),
            set("greet", "greeting", json!("Hello {{ $input.name }}")),
            set("shout", "loud", json!("{{ $node.greet.data.greeting }}!")),
        ],
        vec![EdgeDefinition::new("start", "greet"), EdgeDefinition::new("greet", "shout")],
    );

    let result = run(&h, &wf, input(json!({"name": "Ada"})), ExecutionOptions::default()).await;

    assert_eq!(result.status, ExecutionStatus::Completed, "{:?}", result.error);
    assert!(result.is_success());
    let order: Vec<&str> = result.node_executions.iter().map(|s| s.node_id.as_str()).collect();
    assert_eq!(order, ["start", "greet", "shout"]);
    assert!(result.node_executions.iter().all(|s| s.success));
    assert_eq!(result.output["$node.shout"]["data"]["loud"], json!("Hello Ada!"));
    assert_eq!(result.output["$node.shout"]["data"]["name"], json!("Ada"));
    assert_eq!(result.output["$input"], json!({"name": "Ada"}));
    assert_eq!(result.output["$execution"]["executionId"], json!(result.execution_id));

    let stored = h.repository.get(&result.execution_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
    assert_eq!(stored.node_executions.len(), 3);
    assert!(stored.finished_at.is_some());
}

#[tokio::test]
async fn trigger_http_call_and_assignment() {
    let api = axum::Router::new().route(
        "/users/{id}",
        axum::routing::get(|axum::extract::Path(id): axum::extract::Path<u32>| async move {
            axum::Json(json!({"id": id, "email": format!("user{id}@example.com")}))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api).await.unwrap();
    });

    let services = NodeServices {
        http: reqwest::Client::builder().no_proxy().build().unwrap(),
    };
    let h = harness_with(Arc::new(TracingExecutionLogger), services);
    let wf = workflow(
        vec![
            NodeDefinition::new("start", "manual-trigger"),
            NodeDefinition::new("fetch", "http-request")
                .with_parameter("url", json!(format!("http://{addr}/users/{{{{ $input.userId }}}}"))),
            set("store", "email", json!("{{ $node.fetch.data.body.email }}")),
        ],
        vec![EdgeDefinition::new("start", "fetch"), EdgeDefinition::new("fetch", "store")],
    );

    let result = run(&h, &wf, input(json!({"userId": 7})), ExecutionOptions::default()).await;

    assert_eq!(result.status, ExecutionStatus::Completed, "{:?}", result.error);
    assert_eq!(result.node_executions.len(), 3);
    assert!(result.node_executions.iter().all(|s| s.success));
    assert_eq!(result.output["$node.fetch"]["data"]["status"], json!(200));
    assert_eq!(result.output["$node.store"]["data"]["email"], json!("user7@example.com"));
}

#[tokio::test]
async fn only_the_selected_branch_runs() {
    let h = harness();
    let wf = workflow(
        vec![
            NodeDefinition::new("start", "manual-trigger"),
            NodeDefinition::new("check", "if-condition")
                .with_parameter("left", json!("{{ $input.score }}"))
                .with_parameter("operator", json!("greaterThan"))
                .with_parameter("right", json!(50)),
            set("high", "tier", json!("gold")),
            set("low", "tier", json!("bronze")),
            set("after_high", "notified", json!(true)),
        ],
        vec![
            EdgeDefinition::new("start", "check"),
            EdgeDefinition::conditional("check", "true", "high"),
            EdgeDefinition::conditional("check", "false", "low"),
            EdgeDefinition::new("high", "after_high"),
        ],
    );

    let result = run(&h, &wf, input(json!({"score": 40})), ExecutionOptions::default()).await;

    assert_eq!(result.status, ExecutionStatus::Completed, "{:?}", result.error);
    assert!(result.output.contains_key("$node.low"));
    assert!(!result.output.contains_key("$node.high"));
    assert!(!result.output.contains_key("$node.after_high"));
    assert_eq!(result.output["$node.check"]["selectedOutput"], json!("false"));
    assert_eq!(result.output["$node.low"]["data"]["score"], json!(40));
    assert_eq!(result.skipped_nodes, ["high", "after_high"]);
    assert!(result.summary("high").is_none());
}

#[tokio::test]
async fn failure_stops_the_run_by_default() {
    let h = harness();
    let wf = workflow(
        vec![
            NodeDefinition::new("start", "manual-trigger"),
            NodeDefinition::new("broken", "fail"),
            set("after", "x", json!(1)),
        ],
        vec![EdgeDefinition::new("start", "broken"), EdgeDefinition::new("broken", "after")],
    );

    let result = run(&h, &wf, None, ExecutionOptions::default()).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(
        result.error.as_deref(),
        Some("Node 'broken' failed: downstream service unavailable")
    );
    assert_eq!(result.failed_nodes, ["broken"]);
    assert_eq!(result.node_executions.len(), 2);
    assert!(!result.summary("broken").unwrap().success);
    assert!(result.summary("after").is_none());
    assert!(!result.output.contains_key("$node.after"));

    let stored = h.repository.get(&result.execution_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Failed);
    assert!(stored.error_detail.unwrap().contains("downstream service unavailable"));
}

#[tokio::test]
async fn continue_on_error_runs_everything() {
    let h = harness();
    let wf = workflow(
        vec![
            NodeDefinition::new("start", "manual-trigger"),
            NodeDefinition::new("broken", "fail"),
            set("after", "x", json!(1)),
        ],
        vec![EdgeDefinition::new("start", "broken"), EdgeDefinition::new("broken", "after")],
    );

    let result = run(&h, &wf, None, continue_on_error()).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.node_executions.len(), 3);
    assert_eq!(result.node_executions.iter().filter(|s| !s.success).count(), 1);
    assert_eq!(result.failed_nodes, ["broken"]);
    assert_eq!(result.output["$node.broken"]["success"], json!(false));
    assert_eq!(result.output["$node.after"]["data"]["x"], json!(1));
}

#[tokio::test(start_paused = true)]
async fn parallel_levels_run_concurrently() {
    let h = harness();
    let wf = workflow(
        vec![
            NodeDefinition::new("start", "manual-trigger"),
            sleep("left", 200),
            sleep("right", 200),
            set("join", "joined", json!(true)),
        ],
        vec![
            EdgeDefinition::new("start", "left"),
            EdgeDefinition::new("start", "right"),
            EdgeDefinition::new("left", "join"),
            EdgeDefinition::new("right", "join"),
        ],
    );
    let options = ExecutionOptions {
        enable_parallel_execution: true,
        ..Default::default()
    };

    let started = tokio::time::Instant::now();
    let result = run(&h, &wf, input(json!({"seed": 1})), options).await;
    let elapsed = started.elapsed();

    assert_eq!(result.status, ExecutionStatus::Completed, "{:?}", result.error);
    assert!(elapsed < Duration::from_millis(400), "levels ran sequentially: {elapsed:?}");
    assert_eq!(h.peak.load(Ordering::SeqCst), 2);

    let joined = &result.output["$node.join"]["data"];
    assert_eq!(joined["left"], json!(200));
    assert_eq!(joined["right"], json!(200));
    assert_eq!(joined["seed"], json!(1));
    assert_eq!(result.node_executions.last().unwrap().node_id, "join");
}

#[tokio::test(start_paused = true)]
async fn sequential_mode_never_overlaps_nodes() {
    let h = harness();
    let wf = workflow(
        vec![
            NodeDefinition::new("start", "manual-trigger"),
            sleep("left", 200),
            sleep("right", 200),
        ],
        vec![EdgeDefinition::new("start", "left"), EdgeDefinition::new("start", "right")],
    );

    let started = tokio::time::Instant::now();
    let result = run(&h, &wf, None, ExecutionOptions::default()).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert_eq!(h.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn parallel_mode_prunes_the_branch_not_taken() {
    let h = harness();
    let wf = workflow(
        vec![
            NodeDefinition::new("start", "manual-trigger"),
            NodeDefinition::new("check", "if-condition")
                .with_parameter("left", json!("{{ $input.score }}"))
                .with_parameter("operator", json!("greaterThan"))
                .with_parameter("right", json!(50)),
            set("high", "tier", json!("gold")),
            set("low", "tier", json!("bronze")),
            set("after_high", "notified", json!(true)),
        ],
        vec![
            EdgeDefinition::new("start", "check"),
            EdgeDefinition::conditional("check", "true", "high"),
            EdgeDefinition::conditional("check", "false", "low"),
            EdgeDefinition::new("high", "after_high"),
        ],
    );

    let result = run(&h, &wf, input(json!({"score": 40})), parallel()).await;

    assert_eq!(result.status, ExecutionStatus::Completed, "{:?}", result.error);
    assert_eq!(node_order(&result), ["start", "check", "low"]);
    assert_eq!(result.skipped_nodes, ["high", "after_high"]);
    assert_eq!(result.output["$node.low"]["data"]["tier"], json!("bronze"));
    assert!(!result.output.contains_key("$node.high"));
    assert!(!result.output.contains_key("$node.after_high"));
    assert!(result.failed_nodes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn parallel_failure_stops_before_the_next_level() {
    let h = harness();

    let result = run(&h, &failing_fan_out(), None, parallel()).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(
        result.error.as_deref(),
        Some("Node 'broken' failed: downstream service unavailable")
    );
    assert_eq!(result.failed_nodes, ["broken"]);
    // siblings in the failing level are still recorded, in group order
    assert_eq!(node_order(&result), ["start", "broken", "slow"]);
    assert!(result.summary("slow").unwrap().success);
    assert!(result.output.contains_key("$node.slow"));
    assert!(result.summary("join").is_none());
    assert!(!result.output.contains_key("$node.join"));

    let stored = h.repository.get(&result.execution_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Failed);
    assert_eq!(stored.node_executions.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn parallel_continue_on_error_reaches_the_join() {
    let h = harness();
    let options = ExecutionOptions {
        continue_on_error: true,
        enable_parallel_execution: true,
        ..Default::default()
    };

    let result = run(&h, &failing_fan_out(), None, options).await;

    assert_eq!(result.status, ExecutionStatus::Completed, "{:?}", result.error);
    assert_eq!(node_order(&result), ["start", "broken", "slow", "join"]);
    assert_eq!(result.failed_nodes, ["broken"]);
    assert_eq!(result.output["$node.broken"]["success"], json!(false));
    assert_eq!(result.output["$node.join"]["data"]["joined"], json!(true));
}

#[tokio::test(start_paused = true)]
async fn parallel_limit_is_per_run() {
    let config = EngineConfig {
        max_parallel_nodes: 1,
        ..Default::default()
    };
    let h = harness_on(Arc::new(TracingExecutionLogger), NodeServices::default(), config, None);
    let wf = workflow(
        vec![
            NodeDefinition::new("start", "manual-trigger"),
            sleep("left", 200),
            sleep("right", 200),
        ],
        vec![EdgeDefinition::new("start", "left"), EdgeDefinition::new("start", "right")],
    );

    let started = tokio::time::Instant::now();
    let (first, second) = tokio::join!(run(&h, &wf, None, parallel()), run(&h, &wf, None, parallel()));
    let elapsed = started.elapsed();

    assert_eq!(first.status, ExecutionStatus::Completed);
    assert_eq!(second.status, ExecutionStatus::Completed);
    // one sleeper per run at a time, both runs side by side
    assert_eq!(h.peak.load(Ordering::SeqCst), 2);
    assert!(elapsed >= Duration::from_millis(400), "group was not limited: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(800), "runs throttled each other: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn cancellation_wins_over_an_expired_deadline() {
    let h = harness();
    let wf = workflow(
        vec![
            NodeDefinition::new("start", "manual-trigger"),
            sleep("left", 1_000),
            sleep("right", 1_000),
        ],
        vec![EdgeDefinition::new("start", "left"), EdgeDefinition::new("start", "right")],
    );
    let options = ExecutionOptions {
        timeout: Some(Duration::ZERO),
        enable_parallel_execution: true,
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = h.engine.execute(&wf, None, options, cancel).await;

    assert_eq!(result.status, ExecutionStatus::Cancelled);
    assert!(result.node_executions.is_empty());
    assert_eq!(
        h.engine.get_execution_status(&result.execution_id).await.unwrap(),
        ExecutionStatus::Cancelled
    );
}

#[tokio::test(start_paused = true)]
async fn caller_cancellation_ends_in_cancelled() {
    let h = harness();
    let wf = workflow(
        vec![NodeDefinition::new("start", "manual-trigger"), sleep("slow", 10_000)],
        vec![EdgeDefinition::new("start", "slow")],
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = h.engine.execute(&wf, None, ExecutionOptions::default(), cancel).await;

    assert_eq!(result.status, ExecutionStatus::Cancelled);
    assert!(result.summary("slow").is_none());
    assert_eq!(
        h.engine.get_execution_status(&result.execution_id).await.unwrap(),
        ExecutionStatus::Cancelled
    );
}

#[tokio::test(start_paused = true)]
async fn wall_clock_limit_ends_in_timeout() {
    let h = harness();
    let wf = workflow(
        vec![NodeDefinition::new("start", "manual-trigger"), sleep("slow", 10_000)],
        vec![EdgeDefinition::new("start", "slow")],
    );
    let options = ExecutionOptions {
        timeout: Some(Duration::from_millis(500)),
        ..Default::default()
    };

    let result = run(&h, &wf, None, options).await;

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert!(result.error.unwrap().contains("timed out"));
    assert_eq!(result.node_executions.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn background_run_can_be_cancelled_by_id() {
    let h = harness();
    let wf = workflow(
        vec![NodeDefinition::new("start", "manual-trigger"), sleep("slow", 10_000)],
        vec![EdgeDefinition::new("start", "slow")],
    );

    let execution_id = h.engine.start(wf, None, ExecutionOptions::default()).await;
    assert_eq!(
        h.engine.get_execution_status(&execution_id).await.unwrap(),
        ExecutionStatus::Running
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.engine.cancel_execution(&execution_id).await.unwrap();

    let mut status = ExecutionStatus::Running;
    for _ in 0..100 {
        status = h.engine.get_execution_status(&execution_id).await.unwrap();
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, ExecutionStatus::Cancelled);
    assert!(!h.engine.is_active(&execution_id));
}

#[tokio::test]
async fn invalid_graphs_fail_before_any_node_runs() {
    let h = harness();

    let cyclic = workflow(
        vec![
            NodeDefinition::new("start", "manual-trigger"),
            set("a", "x", json!(1)),
            set("b", "y", json!(2)),
        ],
        vec![
            EdgeDefinition::new("start", "a"),
            EdgeDefinition::new("a", "b"),
            EdgeDefinition::new("b", "a"),
        ],
    );
    let result = run(&h, &cyclic, None, ExecutionOptions::default()).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.unwrap().contains("cycle"));
    assert!(result.node_executions.is_empty());

    let empty = workflow(vec![], vec![]);
    let result = run(&h, &empty, None, ExecutionOptions::default()).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.unwrap().contains("no nodes"));

    let dangling = workflow(
        vec![NodeDefinition::new("start", "manual-trigger")],
        vec![EdgeDefinition::new("start", "ghost")],
    );
    let result = run(&h, &dangling, None, ExecutionOptions::default()).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.unwrap().contains("ghost"));
}

#[tokio::test]
async fn unregistered_node_type_fails_the_node() {
    let h = harness();
    let wf = workflow(
        vec![NodeDefinition::new("start", "manual-trigger"), NodeDefinition::new("odd", "teleport")],
        vec![EdgeDefinition::new("start", "odd")],
    );

    let result = run(&h, &wf, None, ExecutionOptions::default()).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.unwrap().contains("no node registered for type 'teleport'"));
}

#[tokio::test]
async fn status_queries_and_cancel_rules() {
    let h = harness();
    let wf = workflow(vec![NodeDefinition::new("start", "manual-trigger")], vec![]);
    let result = run(&h, &wf, None, ExecutionOptions::default()).await;

    for _ in 0..3 {
        assert_eq!(
            h.engine.get_execution_status(&result.execution_id).await.unwrap(),
            ExecutionStatus::Completed
        );
    }

    let err = h.engine.cancel_execution(&result.execution_id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidStatusTransition {
            from: ExecutionStatus::Completed,
            to: ExecutionStatus::Cancelled
        }
    ));

    assert!(matches!(
        h.engine.get_execution_status("missing").await,
        Err(EngineError::ExecutionNotFound(_))
    ));
    assert!(matches!(
        h.engine.cancel_execution("missing").await,
        Err(EngineError::ExecutionNotFound(_))
    ));
}

#[tokio::test]
async fn cancel_racing_a_finishing_run_keeps_it_completed() {
    let h = harness_on(
        Arc::new(TracingExecutionLogger),
        NodeServices::default(),
        EngineConfig::default(),
        Some(Duration::from_millis(200)),
    );
    let wf = workflow(vec![NodeDefinition::new("start", "manual-trigger")], vec![]);

    let execution_id = h.engine.start(wf, None, ExecutionOptions::default()).await;
    // the status read goes stale while the background run finishes
    let err = h.engine.cancel_execution(&execution_id).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::InvalidStatusTransition {
            from: ExecutionStatus::Completed,
            to: ExecutionStatus::Cancelled
        }
    ));
    let stored = h.repository.get(&execution_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
    assert!(stored.error.is_none());
    assert!(!h.engine.is_active(&execution_id));
}

#[tokio::test]
async fn logger_sees_every_lifecycle_event() {
    let logger = Arc::new(RecordingLogger::default());
    let h = harness_with(Arc::clone(&logger) as Arc<dyn ExecutionLogger>, NodeServices::default());
    let wf = workflow(
        vec![NodeDefinition::new("start", "manual-trigger"), NodeDefinition::new("broken", "fail")],
        vec![EdgeDefinition::new("start", "broken")],
    );

    run(&h, &wf, None, ExecutionOptions::default()).await;

    let events = logger.events();
    assert_eq!(events.first().map(String::as_str), Some("start:wf-test"));
    assert!(events.contains(&"node:start:true".to_string()));
    assert!(events.contains(&"node:broken:false".to_string()));
    assert!(events.contains(&"error".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("complete:Failed"));
}
