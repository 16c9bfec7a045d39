/// SQLite persistence layer for workflow storage
///
/// Handles workflow CRUD operations. Nodes and edges are stored as JSON text
/// columns, matching the snapshot format the engine decodes at run time.

use crate::workflow::types::{Workflow, WorkflowRecord};
use anyhow::Result;
use sqlx::{sqlite::SqlitePool, Row};

/// Workflow definitions persisted as JSON snapshots in SQLite
#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    /// SQLite connection pool
    pool: SqlitePool,
}

impl WorkflowStorage {
    /// Wrap an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `workflows` table
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                nodes TEXT NOT NULL,
                edges TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_workflows_name
            ON workflows(name)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or replace a workflow definition
    pub async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        let record = workflow.to_record()?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, nodes, edges, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                nodes = excluded.nodes,
                edges = excluded.edges,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.nodes)
        .bind(&record.edges)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve the raw record by ID, snapshot columns still encoded
    pub async fn get_record(&self, id: &str) -> Result<Option<WorkflowRecord>> {
        let row = sqlx::query("SELECT id, name, nodes, edges FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| WorkflowRecord {
            id: row.get("id"),
            name: row.get("name"),
            nodes: row.get("nodes"),
            edges: row.get("edges"),
        }))
    }

    /// Retrieve a decoded workflow by ID
    pub async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        match self.get_record(id).await? {
            Some(record) => Ok(Some(Workflow::from_record(&record)?)),
            None => Ok(None),
        }
    }

    /// Summaries of every stored workflow, newest first
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowMetadata>> {
        let rows = sqlx::query(
            "SELECT id, name, CAST(created_at AS TEXT) AS created_at, CAST(updated_at AS TEXT) AS updated_at \
             FROM workflows ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut workflows = Vec::new();
        for row in rows {
            workflows.push(WorkflowMetadata {
                id: row.get("id"),
                name: row.get("name"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            });
        }

        Ok(workflows)
    }

    /// Returns false when no workflow had this id
    pub async fn delete_workflow(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Listing row for a stored workflow
#[derive(Debug, serde::Serialize)]
pub struct WorkflowMetadata {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}
