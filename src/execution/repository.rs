/// Execution record persistence
///
/// The engine persists a `Running` record when a run starts and a terminal
/// record when it ends. Two backends: an in-memory map for tests and
/// embedding, and SQLite through sqlx for the server.

use crate::error::{EngineError, EngineResult};
use crate::execution::types::{ExecutionRecord, ExecutionStatus, NodeExecutionSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::Row;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn create(&self, record: &ExecutionRecord) -> EngineResult<()>;
    async fn update(&self, record: &ExecutionRecord) -> EngineResult<()>;
    /// Write `record` only while the stored status is still `expected`
    ///
    /// Returns false, leaving storage untouched, when the record is missing
    /// or another writer has already moved it on.
    async fn update_if_status(&self, record: &ExecutionRecord, expected: ExecutionStatus) -> EngineResult<bool>;
    async fn get(&self, id: &str) -> EngineResult<Option<ExecutionRecord>>;
    /// Most recent first
    async fn list_for_workflow(&self, workflow_id: &str) -> EngineResult<Vec<ExecutionRecord>>;
}

#[derive(Debug, Default)]
pub struct InMemoryExecutionRepository {
    records: RwLock<HashMap<String, ExecutionRecord>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, record: &ExecutionRecord) -> EngineResult<()> {
        self.records.write().await.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &ExecutionRecord) -> EngineResult<()> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(EngineError::ExecutionNotFound(record.id.clone())),
        }
    }

    async fn update_if_status(&self, record: &ExecutionRecord, expected: ExecutionStatus) -> EngineResult<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(existing) if existing.status == expected => {
                *existing = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, id: &str) -> EngineResult<Option<ExecutionRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list_for_workflow(&self, workflow_id: &str) -> EngineResult<Vec<ExecutionRecord>> {
        let mut records: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.workflow_id == workflow_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(records)
    }
}

/// SQLite-backed execution repository
#[derive(Debug, Clone)]
pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create execution tables. Safe to call multiple times.
    pub async fn init_schema(&self) -> EngineResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                duration_ms INTEGER,
                input TEXT NOT NULL,
                output TEXT,
                error TEXT,
                error_detail TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS node_executions (
                execution_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                node_id TEXT NOT NULL,
                node_type TEXT NOT NULL,
                node_name TEXT NOT NULL,
                success INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                error TEXT,
                PRIMARY KEY (execution_id, position)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_workflow ON executions(workflow_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn write(&self, record: &ExecutionRecord) -> EngineResult<()> {
        let input = serde_json::to_string(&record.input)?;
        let output = record.output.as_ref().map(serde_json::to_string).transpose()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO executions
                (id, workflow_id, status, started_at, finished_at, duration_ms, input, output, error, error_detail)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                finished_at = excluded.finished_at,
                duration_ms = excluded.duration_ms,
                output = excluded.output,
                error = excluded.error,
                error_detail = excluded.error_detail
            "#,
        )
        .bind(&record.id)
        .bind(&record.workflow_id)
        .bind(record.status.as_str())
        .bind(record.started_at.to_rfc3339())
        .bind(record.finished_at.map(|t| t.to_rfc3339()))
        .bind(record.duration_ms.map(|d| d as i64))
        .bind(input)
        .bind(output)
        .bind(&record.error)
        .bind(&record.error_detail)
        .execute(&mut *tx)
        .await?;

        replace_node_executions(&mut *tx, record).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn node_executions(&self, execution_id: &str) -> EngineResult<Vec<NodeExecutionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT node_id, node_type, node_name, success, duration_ms, started_at, finished_at, error
            FROM node_executions WHERE execution_id = ? ORDER BY position
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(NodeExecutionSummary {
                    node_id: row.get("node_id"),
                    node_type: row.get("node_type"),
                    node_name: row.get("node_name"),
                    success: row.get("success"),
                    duration_ms: row.get::<i64, _>("duration_ms").max(0) as u64,
                    started_at: parse_time(row.get("started_at"))?,
                    finished_at: parse_time(row.get("finished_at"))?,
                    error: row.get("error"),
                })
            })
            .collect()
    }

    async fn from_row(&self, row: sqlx::sqlite::SqliteRow) -> EngineResult<ExecutionRecord> {
        let id: String = row.get("id");
        let status: String = row.get("status");
        let input: String = row.get("input");
        let output: Option<String> = row.get("output");
        let finished_at: Option<String> = row.get("finished_at");

        Ok(ExecutionRecord {
            node_executions: self.node_executions(&id).await?,
            workflow_id: row.get("workflow_id"),
            status: status.parse::<ExecutionStatus>().map_err(EngineError::Storage)?,
            started_at: parse_time(row.get("started_at"))?,
            finished_at: finished_at.map(parse_time).transpose()?,
            duration_ms: row.get::<Option<i64>, _>("duration_ms").map(|d| d.max(0) as u64),
            input: serde_json::from_str::<Value>(&input)?,
            output: output.map(|o| serde_json::from_str::<Value>(&o)).transpose()?,
            error: row.get("error"),
            error_detail: row.get("error_detail"),
            id,
        })
    }
}

/// Swap the stored node summaries of one execution for `record`'s
async fn replace_node_executions(conn: &mut SqliteConnection, record: &ExecutionRecord) -> EngineResult<()> {
    sqlx::query("DELETE FROM node_executions WHERE execution_id = ?")
        .bind(&record.id)
        .execute(&mut *conn)
        .await?;

    for (position, summary) in record.node_executions.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO node_executions
                (execution_id, position, node_id, node_type, node_name, success,
                 duration_ms, started_at, finished_at, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(position as i64)
        .bind(&summary.node_id)
        .bind(&summary.node_type)
        .bind(&summary.node_name)
        .bind(summary.success)
        .bind(summary.duration_ms as i64)
        .bind(summary.started_at.to_rfc3339())
        .bind(summary.finished_at.to_rfc3339())
        .bind(&summary.error)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn parse_time(text: String) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| EngineError::Storage(format!("invalid timestamp '{}': {}", text, e)))
}

#[async_trait]
impl ExecutionRepository for SqliteExecutionRepository {
    async fn create(&self, record: &ExecutionRecord) -> EngineResult<()> {
        self.write(record).await
    }

    async fn update(&self, record: &ExecutionRecord) -> EngineResult<()> {
        self.write(record).await
    }

    async fn update_if_status(&self, record: &ExecutionRecord, expected: ExecutionStatus) -> EngineResult<bool> {
        let output = record.output.as_ref().map(serde_json::to_string).transpose()?;

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE executions
            SET status = ?, finished_at = ?, duration_ms = ?, output = ?, error = ?, error_detail = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(record.status.as_str())
        .bind(record.finished_at.map(|t| t.to_rfc3339()))
        .bind(record.duration_ms.map(|d| d as i64))
        .bind(output)
        .bind(&record.error)
        .bind(&record.error_detail)
        .bind(&record.id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        replace_node_executions(&mut *tx, record).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn get(&self, id: &str) -> EngineResult<Option<ExecutionRecord>> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.from_row(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_for_workflow(&self, workflow_id: &str) -> EngineResult<Vec<ExecutionRecord>> {
        let rows = sqlx::query("SELECT * FROM executions WHERE workflow_id = ? ORDER BY started_at DESC")
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.from_row(row).await?);
        }
        Ok(records)
    }
}
