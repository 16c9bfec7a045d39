/// Server setup and initialization
///
/// Wires together all components: storage, node registry, execution engine
/// and HTTP routes. Provides the main application factory for the Axum app.

use crate::{
    api::{create_execution_routes, create_webhook_routes, create_workflow_routes, AppState},
    config::Config,
    execution::{SqliteExecutionRepository, TracingExecutionLogger},
    nodes::{NodeRegistry, NodeServices},
    runtime::{NodeExecutor, TemplateEvaluator, WorkflowExecutionEngine},
    workflow::storage::WorkflowStorage,
};
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Open the SQLite pool, creating the database file and its directory
pub async fn connect_database(url: &str) -> Result<SqlitePool> {
    if let Some(dir) = database_dir(url) {
        tracing::info!("📁 Ensuring data directory exists: {}", dir.display());
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create data directory {}", dir.display()))?;
    }

    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("Invalid database URL: {url}"))?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options)
        .await
        .with_context(|| format!("Failed to open database {url}"))?;
    Ok(pool)
}

/// Parent directory of a file-backed SQLite URL
fn database_dir(url: &str) -> Option<&Path> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path).parent().filter(|dir| !dir.as_os_str().is_empty())
}

/// Build the execution engine over an initialized pool
pub async fn create_engine(pool: SqlitePool, config: &Config) -> Result<Arc<WorkflowExecutionEngine>> {
    let repository = SqliteExecutionRepository::new(pool);
    repository
        .init_schema()
        .await
        .context("Failed to initialize execution schema")?;

    let registry = Arc::new(NodeRegistry::with_builtins());
    tracing::info!("🧩 Registered node types: {:?}", registry.types());

    let executor = NodeExecutor::new(
        registry,
        Arc::new(TemplateEvaluator),
        Arc::new(NodeServices::default()),
        config.engine.node_defaults,
    );

    Ok(Arc::new(WorkflowExecutionEngine::new(
        Arc::new(executor),
        Arc::new(repository),
        Arc::new(TracingExecutionLogger),
        &config.engine,
    )))
}

/// Assemble every route over the shared state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_execution_routes())
        .merge(create_webhook_routes())
        .with_state(state)
}

/// Create the main Axum application with all routes
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("🗄️ Connecting to database: {}", config.database.url);
    let pool = connect_database(&config.database.url).await?;

    tracing::info!("📋 Initializing workflow storage");
    let storage = WorkflowStorage::new(pool.clone());
    storage
        .init_schema()
        .await
        .context("Failed to initialize workflow schema")?;

    tracing::info!("🚀 Initializing execution engine");
    let engine = create_engine(pool, &config).await?;

    let state = AppState {
        storage,
        engine,
        default_options: config.engine.default_options(),
    };

    tracing::info!("✅ Application initialized successfully");
    Ok(router(state))
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Flowwright server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_dir_only_for_file_urls() {
        assert_eq!(database_dir("sqlite://data/flowwright.db"), Some(Path::new("data")));
        assert_eq!(database_dir("sqlite:/var/lib/fw/db.sqlite?mode=rwc"), Some(Path::new("/var/lib/fw")));
        assert_eq!(database_dir("sqlite::memory:"), None);
        assert_eq!(database_dir("sqlite://flowwright.db"), None);
    }
}
