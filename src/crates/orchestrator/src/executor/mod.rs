//! Output stage execution
//!
//! - [`classify`]: maps capability failures to recoverable and
//!   non-recoverable kinds
//! - [`retry`]: bounded retry with backoff around one output tool, plus
//!   fallback selection among alternative output tools

pub mod classify;
pub mod retry;

pub use classify::{classify_error, classify_message, ErrorKind};
pub use retry::{
    try_alternative_tool, OutputCandidate, OutputFailure, OutputSuccess, OutputToolExecutor,
    RetryHistoryEntry,
};
