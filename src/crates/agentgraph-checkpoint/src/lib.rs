//! # agentgraph-checkpoint - Durable step log and state snapshots
//!
//! Every execution writes a replayable record of what it did:
//!
//! - **Step files**: one per executed node, numbered `1..=N` without gaps
//! - **Metadata**: status, step count and node types seen
//! - **Snapshots**: the whole [`RuntimeState`](agentgraph_core::RuntimeState)
//!   after every tool step and at termination
//!
//! State is read back through [`FileCheckpointStore::load_with_fallback`],
//! which consults three tiers in order (see [`sources`]).
//!
//! ## Modules
//!
//! - [`store`]: [`FileCheckpointStore`], atomic writes and the step commit protocol
//! - [`step`]: step kinds and file naming
//! - [`metadata`]: the `metadata.json` document
//! - [`layout`]: directory naming, path-segment validation, on-disk lookup
//! - [`sources`]: [`StateSource`] tiers and [`StateLoader`]
//! - [`records`]: [`TaskRecordStore`] for the task-record tier
//! - [`serializer`]: plain-tree flattening and JSON encoding

pub mod error;
pub mod layout;
pub mod metadata;
pub mod records;
pub mod serializer;
pub mod sources;
pub mod step;
pub mod store;

pub use error::{CheckpointError, Result};
pub use metadata::{WorkflowMetadata, WorkflowStatus, METADATA_FILE};
pub use records::{InMemoryTaskRecords, TaskRecordStore};
pub use serializer::{to_plain_tree, JsonSerializer};
pub use sources::{
    decode_state, LegacyDirectorySource, LoadedState, StateLoader, StateSource, TaskRecordSource,
    TimestampedSnapshotSource,
};
pub use step::{StepKind, StepRecord};
pub use store::{snapshot_file_name, FileCheckpointStore, SnapshotEnvelope};
