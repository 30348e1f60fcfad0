//! `tasks` table access

use crate::Result;
use agentgraph_checkpoint::{CheckpointError, TaskRecordStore, WorkflowStatus};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

/// Type alias for the database connection pool
pub type DatabasePool = SqlitePool;

const CREATE_TASKS_TABLE: &str = "CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY NOT NULL,
    status TEXT NOT NULL DEFAULT 'running',
    state_snapshot TEXT,
    updated_at TEXT NOT NULL
)";

/// One row of the `tasks` table
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaskRecord {
    pub id: String,
    pub status: String,
    /// Serialized `RuntimeState` JSON
    pub state_snapshot: Option<String>,
    /// RFC 3339 timestamp
    pub updated_at: String,
}

/// Task records stored in SQLite
#[derive(Debug, Clone)]
pub struct SqliteTaskRecords {
    pool: DatabasePool,
}

impl SqliteTaskRecords {
    /// Connect and create the `tasks` table if it is missing
    ///
    /// # Arguments
    /// * `database_url` - SQLite connection string (e.g. "sqlite:tasks.db" or "sqlite::memory:")
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Self::from_pool(pool).await
    }

    /// Use an existing pool
    pub async fn from_pool(pool: DatabasePool) -> Result<Self> {
        sqlx::query(CREATE_TASKS_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Fetch a task row
    pub async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let record = sqlx::query_as::<_, TaskRecord>(
            "SELECT id, status, state_snapshot, updated_at FROM tasks WHERE id = ?",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Create or update the status of a task
    pub async fn set_status(&self, task_id: &str, status: WorkflowStatus) -> Result<()> {
        sqlx::query(
            "INSERT INTO tasks (id, status, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
        )
        .bind(task_id)
        .bind(status.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_snapshot(&self, task_id: &str, snapshot: &str) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO tasks (id, state_snapshot, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET state_snapshot = excluded.state_snapshot, updated_at = excluded.updated_at",
        )
        .bind(task_id)
        .bind(snapshot)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn storage_error(e: impl std::fmt::Display) -> CheckpointError {
    CheckpointError::Storage(e.to_string())
}

#[async_trait]
impl TaskRecordStore for SqliteTaskRecords {
    async fn state_snapshot(&self, task_id: &str) -> agentgraph_checkpoint::Result<Option<Value>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT state_snapshot FROM tasks WHERE id = ?")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;

        match row.and_then(|(snapshot,)| snapshot) {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn save_state_snapshot(
        &self,
        task_id: &str,
        snapshot: Value,
    ) -> agentgraph_checkpoint::Result<()> {
        let text = serde_json::to_string(&snapshot)?;
        self.upsert_snapshot(task_id, &text)
            .await
            .map_err(storage_error)?;
        debug!(task_id = %task_id, bytes = text.len(), "Stored state snapshot in task record");
        Ok(())
    }

    async fn record_status(
        &self,
        task_id: &str,
        status: WorkflowStatus,
    ) -> agentgraph_checkpoint::Result<()> {
        self.set_status(task_id, status)
            .await
            .map_err(storage_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgraph_core::RuntimeState;
    use serde_json::json;

    async fn memory_store() -> SqliteTaskRecords {
        // A single connection keeps the in-memory database alive and shared
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteTaskRecords::from_pool(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let records = memory_store().await;
        assert!(records.state_snapshot("task-1").await.unwrap().is_none());

        let state = RuntimeState::new("summarize the report", "");
        records
            .save_state_snapshot("task-1", serde_json::to_value(&state).unwrap())
            .await
            .unwrap();

        let loaded = records.state_snapshot("task-1").await.unwrap().unwrap();
        assert_eq!(loaded["task_goal"], json!("summarize the report"));
    }

    #[tokio::test]
    async fn test_status_and_snapshot_share_a_row() {
        let records = memory_store().await;
        records.set_status("task-2", WorkflowStatus::Running).await.unwrap();
        records
            .save_state_snapshot("task-2", json!({"task_goal": "x"}))
            .await
            .unwrap();
        records.set_status("task-2", WorkflowStatus::Completed).await.unwrap();

        let row = records.get("task-2").await.unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert!(row.state_snapshot.unwrap().contains("task_goal"));
    }

    #[tokio::test]
    async fn test_row_without_snapshot_is_a_miss() {
        let records = memory_store().await;
        records.set_status("task-3", WorkflowStatus::Failed).await.unwrap();
        assert!(records.state_snapshot("task-3").await.unwrap().is_none());
        assert!(records.get("missing").await.unwrap().is_none());
    }
}
