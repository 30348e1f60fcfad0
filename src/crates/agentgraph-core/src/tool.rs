//! Tool capabilities and the explicit tool registry
//!
//! A capability is anything satisfying the fixed contract
//! `(RuntimeState, input, node config) -> StructuredResult`. Tool
//! implementations themselves live outside this crate; the engine only sees
//! the [`Capability`] trait.
//!
//! The [`ToolRegistry`] is built once at process start from an explicit list
//! of capabilities and injected into the orchestrator. There is no global
//! registration.
//!
//! ```rust
//! use agentgraph_core::{FnCapability, StructuredResult, ToolRegistry};
//! use serde_json::json;
//!
//! let registry = ToolRegistry::new().with(
//!     "echo",
//!     FnCapability::new(|_state, input, _config| Ok(StructuredResult::success(input))),
//! );
//! assert!(registry.has_tool("echo"));
//! ```

use crate::error::{CapabilityError, GraphError, Result};
use crate::graph::NodeConfig;
use crate::state::RuntimeState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Outcome reported by a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
    Partial,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Error => "error",
            ResultStatus::Partial => "partial",
        }
    }
}

/// Structured result returned by every capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    pub status: ResultStatus,

    #[serde(default)]
    pub output: Value,

    /// Free-form type tag (`text`, `table`, `report`, ...)
    #[serde(default = "default_output_type")]
    pub output_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<Value>,

    /// Short human-readable findings, used as summary key results
    #[serde(default)]
    pub metrics: Vec<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

fn default_output_type() -> String {
    "text".to_string()
}

impl StructuredResult {
    pub fn new(status: ResultStatus, output: Value) -> Self {
        Self {
            status,
            output,
            output_type: default_output_type(),
            raw_data: None,
            metrics: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn success(output: Value) -> Self {
        Self::new(ResultStatus::Success, output)
    }

    pub fn partial(output: Value) -> Self {
        Self::new(ResultStatus::Partial, output)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ResultStatus::Error, Value::String(message.into()))
    }

    pub fn with_output_type(mut self, output_type: impl Into<String>) -> Self {
        self.output_type = output_type.into();
        self
    }

    pub fn with_raw_data(mut self, raw_data: Value) -> Self {
        self.raw_data = Some(raw_data);
        self
    }

    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metrics.push(metric.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == ResultStatus::Error
    }

    /// Output rendered as text (strings unquoted)
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Result type of a capability invocation
pub type CapabilityResult = std::result::Result<StructuredResult, CapabilityError>;

/// An invokable tool
#[async_trait]
pub trait Capability: Send + Sync {
    /// Invoke the tool
    ///
    /// The state is borrowed read-only; the orchestrator owns all mutation.
    async fn invoke(&self, state: &RuntimeState, input: Value, config: &NodeConfig)
        -> CapabilityResult;
}

type CapabilityFn = dyn Fn(&RuntimeState, Value, &NodeConfig) -> CapabilityResult + Send + Sync;

/// Capability backed by a synchronous closure
#[derive(Clone)]
pub struct FnCapability {
    func: Arc<CapabilityFn>,
}

impl FnCapability {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&RuntimeState, Value, &NodeConfig) -> CapabilityResult + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }
}

impl std::fmt::Debug for FnCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCapability")
            .field("func", &"<function>")
            .finish()
    }
}

#[async_trait]
impl Capability for FnCapability {
    async fn invoke(
        &self,
        state: &RuntimeState,
        input: Value,
        config: &NodeConfig,
    ) -> CapabilityResult {
        (self.func)(state, input, config)
    }
}

/// Registry mapping capability names to implementations
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Capability>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability
    pub fn register(&mut self, name: impl Into<String>, capability: impl Capability + 'static) {
        self.tools.insert(name.into(), Arc::new(capability));
    }

    /// Register an already shared capability
    pub fn register_arc(&mut self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        self.tools.insert(name.into(), capability);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, name: impl Into<String>, capability: impl Capability + 'static) -> Self {
        self.register(name, capability);
        self
    }

    /// Resolve a capability by name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Capability>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::ToolNotFound {
                name: name.to_string(),
                available: self.tool_names().join(", "),
            })
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
