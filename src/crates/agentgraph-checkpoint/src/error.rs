//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// A task, user or session id cannot be used as a path segment
    #[error("Unsafe path segment for {field}: '{value}'")]
    UnsafePathSegment { field: &'static str, value: String },

    /// No checkpoint directory exists for the task
    #[error("Checkpoint directory not found for task {0}")]
    DirectoryNotFound(String),

    /// A checkpoint directory already exists for the task id
    #[error("Checkpoint directory already exists for task {0}")]
    AlreadyExists(String),

    /// Nothing to load
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Step number would break the gapless sequence
    #[error("Step {got} out of order for task {task_id}, expected {expected}")]
    StepOutOfOrder {
        task_id: String,
        expected: u64,
        got: u64,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),
}
