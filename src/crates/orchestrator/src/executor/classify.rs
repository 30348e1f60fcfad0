//! Failure classification for the output stage

use agentgraph_core::{CapabilityError, CapabilityErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of an output tool failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    // Recoverable
    NetworkError,
    TimeoutError,
    RateLimitError,
    TemporaryError,

    // Non-recoverable
    ValidationError,
    AuthenticationError,
    PermissionError,
    BusinessLogicError,
}

impl ErrorKind {
    /// Whether another attempt may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkError
                | ErrorKind::TimeoutError
                | ErrorKind::RateLimitError
                | ErrorKind::TemporaryError
        )
    }
}

impl From<CapabilityErrorKind> for ErrorKind {
    fn from(kind: CapabilityErrorKind) -> Self {
        match kind {
            CapabilityErrorKind::Network => ErrorKind::NetworkError,
            CapabilityErrorKind::Timeout => ErrorKind::TimeoutError,
            CapabilityErrorKind::RateLimit => ErrorKind::RateLimitError,
            CapabilityErrorKind::Temporary => ErrorKind::TemporaryError,
            CapabilityErrorKind::Validation => ErrorKind::ValidationError,
            CapabilityErrorKind::Authentication => ErrorKind::AuthenticationError,
            CapabilityErrorKind::Permission => ErrorKind::PermissionError,
            CapabilityErrorKind::BusinessLogic => ErrorKind::BusinessLogicError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Classify a capability error
///
/// A typed kind attached by the capability wins over the message heuristic.
pub fn classify_error(error: &CapabilityError) -> ErrorKind {
    match error.kind {
        Some(kind) => kind.into(),
        None => classify_message(&error.message),
    }
}

/// Keyword heuristic over an error message
///
/// Unmatched messages are treated as temporary, so unknown failures are
/// retried.
pub fn classify_message(message: &str) -> ErrorKind {
    let msg = message.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| msg.contains(w));

    if has(&["timeout", "timed out"]) {
        ErrorKind::TimeoutError
    } else if has(&["connection", "network", "socket"]) {
        ErrorKind::NetworkError
    } else if has(&["rate", "limit", "throttle"]) {
        ErrorKind::RateLimitError
    } else if has(&["auth"]) {
        ErrorKind::AuthenticationError
    } else if has(&["permission", "forbidden"]) {
        ErrorKind::PermissionError
    } else if has(&["value", "type", "attribute", "key"]) {
        ErrorKind::ValidationError
    } else if has(&["business"]) {
        ErrorKind::BusinessLogicError
    } else {
        ErrorKind::TemporaryError
    }
}
