/// Flowwright server entry point
///
/// Loads configuration from `FLOWWRIGHT_*` environment variables and serves:
/// - Workflow management API at /api/workflows/*
/// - Execution status and cancellation at /api/executions/*
/// - Webhook-triggered runs at /webhook/{workflow_id}/*
/// - Health check at /healthz

use flowwright::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
