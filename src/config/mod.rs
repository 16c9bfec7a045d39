/// Configuration management for the Flowwright engine
///
/// Handles server configuration, database connection and execution defaults.
/// Every value can be overridden through `FLOWWRIGHT_*` environment variables.

use crate::execution::ExecutionOptions;
use crate::graph::EntryPolicy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Execution engine defaults
    pub engine: EngineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// SQLite database for workflows and execution records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL (e.g., "sqlite://data/flowwright.db")
    pub url: String,
}

/// Execution engine defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock limit per run when the request sets none; 0 disables it
    pub default_timeout_secs: u64,
    pub continue_on_error: bool,
    pub enable_parallel_execution: bool,
    /// How to treat workflows with several start nodes
    pub entry_policy: EntryPolicy,
    /// Upper bound on nodes running at once inside one parallel group
    pub max_parallel_nodes: usize,
    /// Per-node retry/timeout defaults, overridable in node configuration
    pub node_defaults: NodeDefaults,
}

/// Node executor defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDefaults {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    /// Per-attempt timeouts below this are raised to it
    pub min_timeout_ms: u64,
}

impl Default for NodeDefaults {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay_ms: 5000,
            timeout_ms: 60_000,
            min_timeout_ms: 1000,
        }
    }
}

impl EngineConfig {
    /// Options applied to a run that does not specify its own
    pub fn default_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            timeout: (self.default_timeout_secs > 0).then(|| Duration::from_secs(self.default_timeout_secs)),
            continue_on_error: self.continue_on_error,
            enable_parallel_execution: self.enable_parallel_execution,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: env_or("FLOWWRIGHT_EXECUTION_TIMEOUT_SECS", 3600),
            continue_on_error: env_or("FLOWWRIGHT_CONTINUE_ON_ERROR", false),
            enable_parallel_execution: env_or("FLOWWRIGHT_PARALLEL", false),
            entry_policy: env_or("FLOWWRIGHT_ENTRY_POLICY", EntryPolicy::Warn),
            max_parallel_nodes: env_or("FLOWWRIGHT_MAX_PARALLEL_NODES", 16usize).max(1),
            node_defaults: NodeDefaults::default(),
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("FLOWWRIGHT_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("FLOWWRIGHT_PORT", 3004),
            },
            database: DatabaseConfig {
                url: std::env::var("FLOWWRIGHT_DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/flowwright.db".to_string()),
            },
            engine: EngineConfig::default(),
        }
    }
}

/// Parse an environment variable, falling back on absence or parse failure
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("⚠️ Ignoring invalid value for {}: '{}'", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_defaults_match_executor_contract() {
        let defaults = NodeDefaults::default();
        assert_eq!(defaults.max_retries, 0);
        assert_eq!(defaults.retry_delay_ms, 5000);
        assert_eq!(defaults.timeout_ms, 60_000);
        assert_eq!(defaults.min_timeout_ms, 1000);
    }

    #[test]
    fn zero_timeout_disables_wall_clock_limit() {
        let mut engine = EngineConfig::default();
        engine.default_timeout_secs = 0;
        assert_eq!(engine.default_options().timeout, None);

        engine.default_timeout_secs = 5;
        assert_eq!(engine.default_options().timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        assert_eq!(env_or::<u16>("FLOWWRIGHT_TEST_UNSET_VARIABLE", 7), 7);
    }
}
