//! File-backed checkpoint store
//!
//! [`FileCheckpointStore`] owns one directory per task and writes three kinds
//! of documents into it:
//!
//! - `metadata.json`, rewritten after every committed step
//! - one step file per executed node, numbered `1..=N` without gaps
//! - whole-state snapshots `state_<NNNNNN>.json`
//!
//! Every write goes to `<name>.tmp` first and is renamed into place, so a
//! reader never sees a partially written file. Step commits are serialized
//! per task: the step number is checked against `metadata.total_steps`,
//! the step file is renamed into place, then the metadata follows. If the
//! metadata write fails the step file is removed again, keeping
//! `total_steps` equal to the number of committed step files. A step file
//! left behind by a crash between the two renames is numbered above
//! `total_steps`; listings skip it and the next commit of that number
//! replaces it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use agentgraph_checkpoint::{FileCheckpointStore, StepKind};
//! use agentgraph_core::RuntimeState;
//! use serde_json::json;
//!
//! # async fn run() -> agentgraph_checkpoint::Result<()> {
//! let store = FileCheckpointStore::new("/var/lib/agentgraph/checkpoints");
//! store.create_workflow_directory("task-1", "user-1", "session-1").await?;
//!
//! let committed = store
//!     .save_step("task-1", 1, &StepKind::planner(), &json!({"action": "FINISH"}))
//!     .await;
//! assert!(committed);
//!
//! store.save("task-1", &RuntimeState::new("goal", "")).await?;
//! let loaded = store.load_with_fallback("task-1").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{CheckpointError, Result};
use crate::layout::{self, validate_segment};
use crate::metadata::{WorkflowMetadata, WorkflowStatus, METADATA_FILE};
use crate::records::TaskRecordStore;
use crate::serializer::{to_plain_tree, JsonSerializer};
use crate::sources::{
    LegacyDirectorySource, LoadedState, StateLoader, StateSource, TaskRecordSource,
    TimestampedSnapshotSource,
};
use crate::step::{parse_step_number, StepKind, StepRecord};
use agentgraph_core::RuntimeState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Envelope of a whole-state snapshot file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub saved_at: DateTime<Utc>,
    pub total_steps: u64,
    pub state: RuntimeState,
}

/// File name of the snapshot taken after `total_steps` steps
pub fn snapshot_file_name(total_steps: u64) -> String {
    format!("state_{:06}.json", total_steps)
}

fn parse_snapshot_number(file_name: &str) -> Option<u64> {
    let digits = file_name.strip_prefix("state_")?.strip_suffix(".json")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Directory of a known task and the lock guarding its metadata
#[derive(Debug, Clone)]
struct TaskSlot {
    dir: PathBuf,
    commit: Arc<Mutex<()>>,
}

impl TaskSlot {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            commit: Arc::new(Mutex::new(())),
        }
    }
}

/// Durable, per-task checkpoint store rooted at a directory
#[derive(Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
    tasks: Arc<RwLock<HashMap<String, TaskSlot>>>,
    serializer: JsonSerializer,
    task_records: Option<Arc<dyn TaskRecordStore>>,
}

impl std::fmt::Debug for FileCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCheckpointStore")
            .field("root", &self.root)
            .field("task_records", &self.task_records.is_some())
            .finish()
    }
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            serializer: JsonSerializer::new(),
            task_records: None,
        }
    }

    /// Attach the task-record tier used by [`load_with_fallback`](Self::load_with_fallback)
    pub fn with_task_records(mut self, records: Arc<dyn TaskRecordStore>) -> Self {
        self.task_records = Some(records);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn task_records(&self) -> Option<&Arc<dyn TaskRecordStore>> {
        self.task_records.as_ref()
    }

    /// Create `<root>/<user>/<session>/<YYYYMMDD>_<HHMMSS>_<task_id>/`
    ///
    /// Writes the initial metadata with status `running`. Unsafe ids, a task
    /// id that already has a directory under the root, and I/O failures are
    /// returned as errors.
    pub async fn create_workflow_directory(
        &self,
        task_id: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<PathBuf> {
        validate_segment("task_id", task_id)?;
        validate_segment("user_id", user_id)?;
        validate_segment("session_id", session_id)?;

        let already_exists = || CheckpointError::AlreadyExists(task_id.to_string());
        let cached = self.tasks.read().await.contains_key(task_id);
        if cached || layout::find_task_directory(&self.root, task_id).await.is_some() {
            return Err(already_exists());
        }

        let started_at = Utc::now();
        let session_dir = self.root.join(user_id).join(session_id);
        tokio::fs::create_dir_all(&session_dir).await?;
        let dir = session_dir.join(layout::directory_name(task_id, started_at));
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Err(already_exists()),
            Err(e) => return Err(e.into()),
        }

        let metadata = WorkflowMetadata::new(task_id, user_id, session_id, started_at);
        self.write_atomic(&dir.join(METADATA_FILE), &metadata).await?;

        self.tasks
            .write()
            .await
            .insert(task_id.to_string(), TaskSlot::new(dir.clone()));
        self.mirror_status(task_id, WorkflowStatus::Running).await;

        info!(task_id = %task_id, path = %dir.display(), "Created checkpoint directory");
        Ok(dir)
    }

    /// Directory of a task, scanning the root when it is not cached
    pub async fn directory(&self, task_id: &str) -> Result<PathBuf> {
        Ok(self.slot(task_id).await?.dir)
    }

    async fn slot(&self, task_id: &str) -> Result<TaskSlot> {
        validate_segment("task_id", task_id)?;

        if let Some(slot) = self.tasks.read().await.get(task_id) {
            return Ok(slot.clone());
        }

        let dir = layout::find_task_directory(&self.root, task_id)
            .await
            .ok_or_else(|| CheckpointError::DirectoryNotFound(task_id.to_string()))?;
        debug!(task_id = %task_id, path = %dir.display(), "Found checkpoint directory on disk");
        let slot = self
            .tasks
            .write()
            .await
            .entry(task_id.to_string())
            .or_insert_with(|| TaskSlot::new(dir))
            .clone();
        Ok(slot)
    }

    /// Commit one step file
    ///
    /// Returns `true` once both the step file and the metadata are on disk.
    /// Any failure, including a step number that is not exactly
    /// `total_steps + 1`, is logged and reported as `false`.
    pub async fn save_step<T: Serialize + ?Sized>(
        &self,
        task_id: &str,
        step_number: u64,
        kind: &StepKind,
        output: &T,
    ) -> bool {
        match self.commit_step(task_id, step_number, kind, output).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    task_id = %task_id,
                    step = step_number,
                    node_kind = %kind.file_kind(),
                    error = %e,
                    "Failed to save checkpoint step"
                );
                false
            }
        }
    }

    async fn commit_step<T: Serialize + ?Sized>(
        &self,
        task_id: &str,
        step_number: u64,
        kind: &StepKind,
        output: &T,
    ) -> Result<()> {
        let TaskSlot { dir, commit } = self.slot(task_id).await?;
        let _guard = commit.lock().await;

        let mut metadata = self.read_metadata(&dir).await?;
        let expected = metadata.total_steps + 1;
        if step_number != expected {
            return Err(CheckpointError::StepOutOfOrder {
                task_id: task_id.to_string(),
                expected,
                got: step_number,
            });
        }
        self.remove_uncommitted_steps(&dir, metadata.total_steps).await?;

        let now = Utc::now();
        let record = StepRecord {
            step_number,
            node_kind: kind.file_kind(),
            tool_name: kind.tool_name().map(str::to_string),
            timestamp: now,
            output: to_plain_tree(output)?,
        };
        let step_path = dir.join(kind.file_name(step_number));
        self.write_atomic(&step_path, &record).await?;

        metadata.record_step(step_number, &kind.node_type(), now);
        if let Err(e) = self.write_atomic(&dir.join(METADATA_FILE), &metadata).await {
            if let Err(cleanup) = tokio::fs::remove_file(&step_path).await {
                warn!(path = %step_path.display(), error = %cleanup, "Failed to roll back step file");
            }
            return Err(e);
        }

        debug!(task_id = %task_id, step = step_number, node_kind = %record.node_kind, "Saved step");
        Ok(())
    }

    /// Committed step files ordered by step number
    ///
    /// Files numbered above `metadata.total_steps` were never committed and
    /// are left out.
    pub async fn list_step_files(&self, task_id: &str) -> Result<Vec<(u64, PathBuf)>> {
        let dir = self.directory(task_id).await?;
        let committed = self.read_metadata(&dir).await?.total_steps;
        let mut steps = self.step_files(&dir).await?;
        steps.retain(|(n, _)| *n <= committed);
        Ok(steps)
    }

    async fn step_files(&self, dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
        let mut steps = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(n) = name.to_str().and_then(parse_step_number) {
                steps.push((n, entry.path()));
            }
        }
        steps.sort_by_key(|(n, _)| *n);
        Ok(steps)
    }

    async fn remove_uncommitted_steps(&self, dir: &Path, committed: u64) -> Result<()> {
        for (n, path) in self.step_files(dir).await? {
            if n > committed {
                warn!(path = %path.display(), "Removing uncommitted step file");
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    /// Read every committed step in order
    pub async fn load_steps(&self, task_id: &str) -> Result<Vec<StepRecord>> {
        let mut records = Vec::new();
        for (_, path) in self.list_step_files(task_id).await? {
            let bytes = tokio::fs::read(&path).await?;
            records.push(self.serializer.loads(&bytes)?);
        }
        Ok(records)
    }

    /// Write a whole-state snapshot named after the current step count
    pub async fn save(&self, task_id: &str, state: &RuntimeState) -> Result<PathBuf> {
        let TaskSlot { dir, commit } = self.slot(task_id).await?;
        let total_steps = {
            let _guard = commit.lock().await;
            self.read_metadata(&dir).await?.total_steps
        };

        let envelope = SnapshotEnvelope {
            saved_at: Utc::now(),
            total_steps,
            state: state.clone(),
        };
        let path = dir.join(snapshot_file_name(total_steps));
        self.write_atomic(&path, &envelope).await?;
        debug!(task_id = %task_id, total_steps, "Saved state snapshot");
        Ok(path)
    }

    /// Latest snapshot in the task's timestamped directory
    pub async fn load_latest_snapshot(&self, task_id: &str) -> Result<Option<SnapshotEnvelope>> {
        let dir = match self.directory(task_id).await {
            Ok(dir) => dir,
            Err(CheckpointError::DirectoryNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut latest: Option<(u64, PathBuf)> = None;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(n) = name.to_str().and_then(parse_snapshot_number) {
                if latest.as_ref().map(|(m, _)| n > *m).unwrap_or(true) {
                    latest = Some((n, entry.path()));
                }
            }
        }

        match latest {
            Some((_, path)) => {
                let bytes = tokio::fs::read(&path).await?;
                Ok(Some(self.serializer.loads(&bytes)?))
            }
            None => Ok(None),
        }
    }

    pub async fn load_metadata(&self, task_id: &str) -> Result<WorkflowMetadata> {
        let dir = self.directory(task_id).await?;
        self.read_metadata(&dir).await
    }

    pub async fn step_count(&self, task_id: &str) -> Result<u64> {
        Ok(self.load_metadata(task_id).await?.total_steps)
    }

    /// Set the workflow status, with an optional failure trace
    ///
    /// The status is copied to the attached task record as well.
    pub async fn update_status(
        &self,
        task_id: &str,
        status: WorkflowStatus,
        failure: Option<Value>,
    ) -> Result<()> {
        let TaskSlot { dir, commit } = self.slot(task_id).await?;
        {
            let _guard = commit.lock().await;
            let mut metadata = self.read_metadata(&dir).await?;
            metadata.workflow_status = status;
            if failure.is_some() {
                metadata.failure = failure;
            }
            metadata.last_update_time = Utc::now();
            self.write_atomic(&dir.join(METADATA_FILE), &metadata).await?;
        }
        self.mirror_status(task_id, status).await;

        info!(task_id = %task_id, status = %status, "Updated workflow status");
        Ok(())
    }

    /// Task-record status is best effort; `metadata.json` stays authoritative
    async fn mirror_status(&self, task_id: &str, status: WorkflowStatus) {
        let Some(records) = &self.task_records else {
            return;
        };
        if let Err(e) = records.record_status(task_id, status).await {
            warn!(task_id = %task_id, status = %status, error = %e, "Failed to update task record status");
        }
    }

    /// Default state tiers: timestamped snapshot, legacy directory, task record
    pub fn state_sources(&self) -> Vec<Arc<dyn StateSource>> {
        let mut sources: Vec<Arc<dyn StateSource>> = vec![
            Arc::new(TimestampedSnapshotSource::new(self.clone())),
            Arc::new(LegacyDirectorySource::new(self.root.clone())),
        ];
        if let Some(records) = &self.task_records {
            sources.push(Arc::new(TaskRecordSource::new(records.clone())));
        }
        sources
    }

    /// Load state from the first tier that has it
    pub async fn load_with_fallback(&self, task_id: &str) -> Result<LoadedState> {
        validate_segment("task_id", task_id)?;
        StateLoader::new(self.state_sources()).load(task_id).await
    }

    async fn read_metadata(&self, dir: &Path) -> Result<WorkflowMetadata> {
        let bytes = tokio::fs::read(dir.join(METADATA_FILE)).await?;
        self.serializer.loads(&bytes)
    }

    async fn write_atomic<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = self.serializer.dumps(value)?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}
