//! Detached executions
//!
//! A run started with [`Orchestrator::spawn_execution`] lives on its own
//! tokio task. The returned [`ExecutionHandle`] only observes it: dropping
//! the handle (for example when a streaming client disconnects) leaves the
//! run going until it terminates and checkpoints normally.

use super::engine::{ExecutionOutcome, ExecutionRequest, Orchestrator};
use crate::Result;
use tokio::task::JoinHandle;
use tracing::info;

/// Handle to a detached execution
#[derive(Debug)]
pub struct ExecutionHandle {
    task_id: String,
    join: JoinHandle<Result<ExecutionOutcome>>,
}

impl ExecutionHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to terminate
    pub async fn wait(self) -> Result<ExecutionOutcome> {
        self.join.await?
    }
}

impl Orchestrator {
    /// Run an execution on a detached tokio task
    pub fn spawn_execution(&self, request: ExecutionRequest) -> ExecutionHandle {
        let task_id = request.task_id.clone();
        let orchestrator = self.clone();
        info!(task_id = %task_id, "Spawning detached execution");
        let join = tokio::spawn(async move { orchestrator.run(request).await });
        ExecutionHandle { task_id, join }
    }
}
