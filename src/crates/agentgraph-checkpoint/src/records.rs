//! Task-record storage for state snapshots
//!
//! The task platform keeps one persisted record per task. Its
//! `state_snapshot` column is the last fallback tier when loading state,
//! and its status follows the workflow status in `metadata.json`.
//! The SQLite implementation lives with the orchestrator's database layer;
//! [`InMemoryTaskRecords`] serves tests and single-process setups.

use crate::error::Result;
use crate::metadata::WorkflowStatus;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read/write access to the `state_snapshot` of a task record
#[async_trait]
pub trait TaskRecordStore: Send + Sync {
    /// Stored snapshot, if the task has one
    async fn state_snapshot(&self, task_id: &str) -> Result<Option<Value>>;

    /// Create or replace the snapshot
    async fn save_state_snapshot(&self, task_id: &str, snapshot: Value) -> Result<()>;

    /// Create or update the status of the record
    async fn record_status(&self, task_id: &str, status: WorkflowStatus) -> Result<()>;
}

/// Task records held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRecords {
    records: Arc<RwLock<HashMap<String, Value>>>,
    statuses: Arc<RwLock<HashMap<String, WorkflowStatus>>>,
}

impl InMemoryTaskRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status(&self, task_id: &str) -> Option<WorkflowStatus> {
        self.statuses.read().await.get(task_id).copied()
    }

    /// Number of stored snapshots
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TaskRecordStore for InMemoryTaskRecords {
    async fn state_snapshot(&self, task_id: &str) -> Result<Option<Value>> {
        Ok(self.records.read().await.get(task_id).cloned())
    }

    async fn save_state_snapshot(&self, task_id: &str, snapshot: Value) -> Result<()> {
        self.records
            .write()
            .await
            .insert(task_id.to_string(), snapshot);
        Ok(())
    }

    async fn record_status(&self, task_id: &str, status: WorkflowStatus) -> Result<()> {
        self.statuses
            .write()
            .await
            .insert(task_id.to_string(), status);
        Ok(())
    }
}
