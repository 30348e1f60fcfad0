//! Graph execution
//!
//! - [`engine`]: the [`Orchestrator`] loop
//! - [`phase`]: execution phases and allowed transitions
//! - [`handle`]: detached runs that survive their caller

pub mod engine;
pub mod handle;
pub mod phase;

pub use engine::{ExecutionOutcome, ExecutionRequest, Orchestrator, DEFAULT_SESSION, DEFAULT_USER};
pub use handle::ExecutionHandle;
pub use phase::Phase;
