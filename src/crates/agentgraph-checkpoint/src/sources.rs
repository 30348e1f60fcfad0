//! State sources and the tiered fallback loader
//!
//! Loading state for a task walks an ordered list of [`StateSource`]s and
//! returns the first hit:
//!
//! ```text
//! load_with_fallback(task_id)
//!     │
//!     ├─ 1. TimestampedSnapshotSource   <..>/<ts>_<task_id>/state_<N>.json (highest N)
//!     │        miss / error
//!     ├─ 2. LegacyDirectorySource       <..>/<task_id>/state.json
//!     │        miss / error
//!     ├─ 3. TaskRecordSource            tasks.state_snapshot
//!     │        miss / error
//!     └─ CheckpointError::NotFound
//! ```
//!
//! A tier that fails is logged and counts as a miss.

use crate::error::{CheckpointError, Result};
use crate::layout;
use crate::records::TaskRecordStore;
use crate::store::{FileCheckpointStore, SnapshotEnvelope};
use agentgraph_core::RuntimeState;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// A place runtime state can be loaded from
#[async_trait]
pub trait StateSource: Send + Sync {
    /// Tier name used in logs and CLI output
    fn name(&self) -> &str;

    async fn try_load(&self, task_id: &str) -> Result<Option<RuntimeState>>;
}

/// Decode either a snapshot envelope or a bare state document
pub fn decode_state(value: Value) -> Result<RuntimeState> {
    let is_envelope = value.get("state").is_some() && value.get("total_steps").is_some();
    if is_envelope {
        let envelope: SnapshotEnvelope = serde_json::from_value(value)?;
        Ok(envelope.state)
    } else {
        Ok(serde_json::from_value(value)?)
    }
}

/// Tier 1: latest snapshot in the timestamped task directory
#[derive(Debug, Clone)]
pub struct TimestampedSnapshotSource {
    store: FileCheckpointStore,
}

impl TimestampedSnapshotSource {
    pub fn new(store: FileCheckpointStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StateSource for TimestampedSnapshotSource {
    fn name(&self) -> &str {
        "timestamped_snapshot"
    }

    async fn try_load(&self, task_id: &str) -> Result<Option<RuntimeState>> {
        Ok(self
            .store
            .load_latest_snapshot(task_id)
            .await?
            .map(|envelope| envelope.state))
    }
}

/// Tier 2: `state.json` in a legacy non-timestamped directory
#[derive(Debug, Clone)]
pub struct LegacyDirectorySource {
    root: PathBuf,
}

impl LegacyDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StateSource for LegacyDirectorySource {
    fn name(&self) -> &str {
        "legacy_directory"
    }

    async fn try_load(&self, task_id: &str) -> Result<Option<RuntimeState>> {
        let Some(path) = layout::find_legacy_state_file(&self.root, task_id).await else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(&path).await?;
        let value: Value = serde_json::from_slice(&bytes)?;
        decode_state(value).map(Some)
    }
}

/// Tier 3: the `state_snapshot` column of the task record
#[derive(Clone)]
pub struct TaskRecordSource {
    records: Arc<dyn TaskRecordStore>,
}

impl TaskRecordSource {
    pub fn new(records: Arc<dyn TaskRecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl StateSource for TaskRecordSource {
    fn name(&self) -> &str {
        "task_record"
    }

    async fn try_load(&self, task_id: &str) -> Result<Option<RuntimeState>> {
        match self.records.state_snapshot(task_id).await? {
            Some(value) => decode_state(value).map(Some),
            None => Ok(None),
        }
    }
}

/// State returned by the loader, tagged with the tier that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedState {
    pub state: RuntimeState,
    pub source: String,
}

/// Ordered list of state sources; first hit wins
#[derive(Clone)]
pub struct StateLoader {
    sources: Vec<Arc<dyn StateSource>>,
}

impl StateLoader {
    pub fn new(sources: Vec<Arc<dyn StateSource>>) -> Self {
        Self { sources }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn load(&self, task_id: &str) -> Result<LoadedState> {
        for source in &self.sources {
            match source.try_load(task_id).await {
                Ok(Some(state)) => {
                    debug!(task_id = %task_id, source = source.name(), "Loaded state");
                    return Ok(LoadedState {
                        state,
                        source: source.name().to_string(),
                    });
                }
                Ok(None) => {
                    debug!(task_id = %task_id, source = source.name(), "State source miss");
                }
                Err(e) => {
                    warn!(
                        task_id = %task_id,
                        source = source.name(),
                        error = %e,
                        "State source failed, trying next tier"
                    );
                }
            }
        }
        Err(CheckpointError::NotFound(format!(
            "no state for task {} in any of [{}]",
            task_id,
            self.source_names().join(", ")
        )))
    }
}
