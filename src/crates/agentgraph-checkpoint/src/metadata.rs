//! Workflow metadata document (`metadata.json`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Name of the metadata file inside a checkpoint directory
pub const METADATA_FILE: &str = "metadata.json";

/// Lifecycle status of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Contents of `metadata.json`
///
/// `total_steps` always equals the number of committed step files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub task_id: String,
    pub session_id: String,
    pub user_id: String,
    pub workflow_start_time: DateTime<Utc>,
    /// Epoch seconds
    pub workflow_start_timestamp: i64,
    pub last_update_time: DateTime<Utc>,
    pub total_steps: u64,
    pub node_types_executed: Vec<String>,
    pub workflow_status: WorkflowStatus,

    /// Failure trace, set when the workflow fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Value>,
}

impl WorkflowMetadata {
    pub fn new(
        task_id: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            workflow_start_time: started_at,
            workflow_start_timestamp: started_at.timestamp(),
            last_update_time: started_at,
            total_steps: 0,
            node_types_executed: Vec::new(),
            workflow_status: WorkflowStatus::Running,
            failure: None,
        }
    }

    /// Register a committed step
    pub(crate) fn record_step(&mut self, step_number: u64, node_type: &str, at: DateTime<Utc>) {
        self.total_steps = step_number;
        if !self.node_types_executed.iter().any(|t| t == node_type) {
            self.node_types_executed.push(node_type.to_string());
        }
        self.last_update_time = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_wire_shape() {
        let started = Utc::now();
        let mut meta = WorkflowMetadata::new("t1", "u1", "s1", started);
        meta.record_step(1, "planner", started);
        meta.record_step(2, "call_tool", started);
        meta.record_step(3, "planner", started);

        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["workflow_status"], "running");
        assert_eq!(value["total_steps"], 3);
        assert_eq!(value["node_types_executed"], serde_json::json!(["planner", "call_tool"]));
        assert_eq!(value["workflow_start_timestamp"], started.timestamp());
        assert!(value["workflow_start_time"].as_str().unwrap().contains('T'));
        assert!(value.get("failure").is_none());
    }
}
