//! # agentgraph-core - Graph model and runtime state for agent execution
//!
//! This crate holds the pieces of the agent execution engine that carry no
//! I/O of their own:
//!
//! - **Graph definitions** ([`GraphDefinition`], [`NodeDefinition`],
//!   [`EdgeDefinition`]) loaded from YAML or JSON and validated up front.
//! - **Graph store** ([`GraphStore`], [`InMemoryGraphStore`]) indexing edges
//!   by `(source, decision key)`.
//! - **Typed decisions** ([`Decision`], [`DecisionKey`]) emitted by router
//!   nodes through a [`DecisionProvider`].
//! - **Tool registry** ([`ToolRegistry`]) mapping capability names to
//!   [`Capability`] implementations.
//! - **Runtime state** ([`RuntimeState`]) threaded through every step.
//!
//! ## Execution shape
//!
//! ```text
//! PLANNING ──CALL_TOOL──▶ EXECUTING_TOOL ──▶ REFLECTING ──┐
//!    ▲                                                    │
//!    └────────────────────────────────────────────────────┘
//!    │
//!    └──FINISH──▶ OUTPUTTING ──OUTPUT──▶ FINALIZING_OUTPUT_TOOL ──▶ TERMINATED
//! ```
//!
//! The loop itself, checkpointing and output retries live in the
//! `orchestrator` and `agentgraph-checkpoint` crates.
//!
//! ## Quick Start
//!
//! ```rust
//! use agentgraph_core::{Decision, DecisionKey, GraphStore, InMemoryGraphStore};
//! use serde_json::json;
//!
//! let store = InMemoryGraphStore::from_yaml_str(r#"
//! name: research
//! nodes:
//!   - { name: planner, kind: ROUTER }
//!   - { name: Search, kind: TOOL, capability: web_search }
//!   - { name: reflection, kind: ROUTER }
//! edges:
//!   - { source: planner, target: Search, condition: "CALL_TOOL:Search" }
//!   - { source: Search, target: reflection }
//!   - { source: reflection, target: planner }
//!   - { source: planner, target: END, condition: FINISH }
//! "#).unwrap();
//!
//! let decision = Decision::call_tool("Search", json!({"q": "rust"}));
//! let next = store.next_node("planner", decision.key().as_ref()).unwrap();
//! assert_eq!(next, "Search");
//! assert_eq!(store.next_node("planner", Some(&DecisionKey::finish())).unwrap(), "END");
//! ```

pub mod decision;
pub mod error;
pub mod graph;
pub mod provider;
pub mod state;
pub mod store;
pub mod tool;

pub use decision::{Decision, DecisionKey, DecisionKind};
pub use error::{CapabilityError, CapabilityErrorKind, GraphError, Result};
pub use graph::{
    EdgeDefinition, GraphDefinition, NodeConfig, NodeDefinition, NodeKind, END, ENTRY_NODE,
};
pub use provider::{DecisionProvider, ScriptedProvider};
pub use state::{
    ActionRecord, ActionSummary, ActionTiming, RuntimeState, SummaryLimits, TodoItem, TodoList,
    TodoStatus, UsageCounters, DATA_MARKER_PREFIX, STATE_SCHEMA_VERSION,
};
pub use store::{GraphStore, InMemoryGraphStore};
pub use tool::{
    Capability, CapabilityResult, FnCapability, ResultStatus, StructuredResult, ToolRegistry,
};
