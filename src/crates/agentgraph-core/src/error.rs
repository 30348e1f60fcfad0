//! Error types for graph definition, routing and capability invocation
//!
//! All errors implement `std::error::Error` via the `thiserror` crate.
//!
//! # Error Hierarchy
//!
//! ```text
//! GraphError
//! ├── Validation           - Graph structure errors found at load time
//! ├── NodeNotFound         - A node name resolved at runtime does not exist
//! ├── EntryNodeMissing     - No `planner` node in the graph
//! ├── NoMatchingEdge       - A router decision matched no outgoing edge
//! ├── InvalidConditionKey  - A condition key string could not be parsed
//! ├── ToolNotFound         - Registry has no capability under that name
//! ├── InvalidTransition    - Phase transition outside the execution diagram
//! ├── Decision             - The decision provider failed for a router node
//! ├── Serialization        - JSON errors
//! └── Yaml                 - YAML errors
//!
//! CapabilityError          - Returned by a tool capability; never fatal to the run
//! ```
//!
//! `GraphError` variants are structural: the orchestrator fails fast on them.
//! `CapabilityError` is data: it is recorded into the action history (or, in
//! the output stage, classified for retry) and the run continues.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Structural and configuration errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// Graph structure validation failed
    ///
    /// **Common causes**: duplicate node names, an edge referencing an
    /// unknown node, a `TOOL` node with more than one unconditional edge.
    #[error("Graph validation failed: {0}")]
    Validation(String),

    /// Node not present in the graph store
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// The graph has no entry node
    #[error("Entry node '{0}' is not defined")]
    EntryNodeMissing(String),

    /// No outgoing edge matches the decision emitted by a router
    #[error("No edge from '{node}' matches decision '{decision}'")]
    NoMatchingEdge { node: String, decision: String },

    /// A condition key string could not be parsed
    #[error("Invalid condition key '{0}'")]
    InvalidConditionKey(String),

    /// Capability name unknown to the tool registry
    #[error("Tool '{name}' is not registered. Available tools: {available}")]
    ToolNotFound { name: String, available: String },

    /// Transition between execution phases not allowed by the diagram
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Decision provider failed for a router node
    #[error("Decision for node '{node}' failed: {error}")]
    Decision { node: String, error: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl GraphError {
    /// Create a decision error for a router node
    pub fn decision(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Decision {
            node: node.into(),
            error: error.into(),
        }
    }
}

/// Optional hint a capability attaches to its error
///
/// When present the output stage uses it instead of guessing the failure
/// class from the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityErrorKind {
    Network,
    Timeout,
    RateLimit,
    Temporary,
    Validation,
    Authentication,
    Permission,
    BusinessLogic,
}

/// Error returned by a tool capability
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct CapabilityError {
    /// Human readable message
    pub message: String,

    /// Optional typed classification hint
    pub kind: Option<CapabilityErrorKind>,
}

impl CapabilityError {
    /// Create an error with only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    /// Create an error with a classification hint
    pub fn with_kind(kind: CapabilityErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind),
        }
    }
}

impl From<String> for CapabilityError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for CapabilityError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
