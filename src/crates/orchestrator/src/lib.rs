//! Execution engine for graph-driven agents
//!
//! This crate drives the Planner → Tool → Reflection → Output loop over a
//! graph from `agentgraph-core`, checkpointing every step through
//! `agentgraph-checkpoint`, and wraps the terminal output tool in a bounded
//! retry and fallback engine.
//!
//! - [`execution`]: the [`Orchestrator`] loop, phase machine and detached runs
//! - [`executor`]: the [`OutputToolExecutor`] and failure classification
//! - [`config`]: [`EngineConfig`] and the YAML loader
//! - [`db`]: SQLite task records backing the last state-loading tier

pub mod config;
pub mod db;
pub mod execution;
pub mod executor;
pub mod logging;

use agentgraph_checkpoint::CheckpointError;
use agentgraph_core::GraphError;
use thiserror::Error;

pub use config::{EngineConfig, OutputRetrySettings};
pub use db::SqliteTaskRecords;
pub use execution::{
    ExecutionHandle, ExecutionOutcome, ExecutionRequest, Orchestrator, Phase,
};
pub use executor::{
    classify_error, try_alternative_tool, ErrorKind, OutputCandidate, OutputFailure,
    OutputSuccess, OutputToolExecutor, RetryHistoryEntry,
};

/// Errors that can occur during orchestration
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Structural or configuration error in the graph, registry or provider
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Checkpoint directory could not be created or read
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Safety ceiling on executed nodes reached
    #[error("Task {task_id} exceeded the limit of {limit} steps")]
    StepLimitExceeded { task_id: String, limit: u64 },

    /// Safety ceiling on wall-clock time reached
    #[error("Task {task_id} exceeded its time budget of {budget_secs}s")]
    TimeBudgetExceeded { task_id: String, budget_secs: u64 },

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Task-record database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Detached execution panicked or was aborted
    #[error("Execution task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;
