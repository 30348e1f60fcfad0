//! SQLite persistence for task records
//!
//! The `tasks` table holds one row per task with its status and the last
//! persisted state snapshot. It backs the final state-loading tier.

pub mod task_records;

pub use task_records::{DatabasePool, SqliteTaskRecords, TaskRecord};
