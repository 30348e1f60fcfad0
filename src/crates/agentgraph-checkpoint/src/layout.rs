//! On-disk layout of checkpoint directories
//!
//! ```text
//! <root>/
//! └── <user>/
//!     └── <session>/
//!         ├── 20250114_093012_<task_id>/     current layout
//!         │   ├── metadata.json
//!         │   ├── 1_planner.json
//!         │   ├── 2_call_tool_Search.json
//!         │   └── state_000002.json
//!         └── <task_id>/                     legacy layout
//!             └── state.json
//! ```

use crate::error::{CheckpointError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Snapshot file name in the legacy layout
pub const LEGACY_STATE_FILE: &str = "state.json";

static SAFE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$").unwrap());

static TIMESTAMPED_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}_\d{6}_(.+)$").unwrap());

/// Reject ids that cannot be used verbatim as a directory name
pub fn validate_segment(field: &'static str, value: &str) -> Result<()> {
    if value == "." || value == ".." || !SAFE_SEGMENT.is_match(value) {
        return Err(CheckpointError::UnsafePathSegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Directory name for a task created at `created_at`
pub fn directory_name(task_id: &str, created_at: DateTime<Utc>) -> String {
    format!("{}_{}", created_at.format("%Y%m%d_%H%M%S"), task_id)
}

/// Task id encoded in a timestamped directory name
pub fn task_id_of(dir_name: &str) -> Option<&str> {
    TIMESTAMPED_DIR
        .captures(dir_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Every `<root>/<user>/<session>` directory
async fn session_dirs(root: &Path) -> Vec<PathBuf> {
    let mut sessions = Vec::new();
    for user in read_dirs(root).await {
        sessions.extend(read_dirs(&user).await);
    }
    sessions
}

/// Subdirectories of `path`; unreadable entries are skipped
async fn read_dirs(path: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(path).await else {
        return dirs;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if matches!(entry.file_type().await, Ok(kind) if kind.is_dir()) {
            dirs.push(entry.path());
        }
    }
    dirs
}

/// Newest timestamped directory for a task
pub async fn find_task_directory(root: &Path, task_id: &str) -> Option<PathBuf> {
    let mut newest: Option<PathBuf> = None;
    for session in session_dirs(root).await {
        for dir in read_dirs(&session).await {
            let matches = dir
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(task_id_of)
                .is_some_and(|id| id == task_id);
            if matches && newest.as_ref().map_or(true, |n| dir.file_name() > n.file_name()) {
                newest = Some(dir);
            }
        }
    }
    newest
}

/// Legacy `<root>/<user>/<session>/<task_id>/state.json` for a task
pub async fn find_legacy_state_file(root: &Path, task_id: &str) -> Option<PathBuf> {
    for session in session_dirs(root).await {
        let path = session.join(task_id).join(LEGACY_STATE_FILE);
        if matches!(tokio::fs::metadata(&path).await, Ok(meta) if meta.is_file()) {
            return Some(path);
        }
    }
    None
}
