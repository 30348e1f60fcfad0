//! Graph definitions: nodes, edges and validation
//!
//! A graph is provisioned externally and read-only at runtime. It has two
//! kinds of nodes:
//!
//! - **`ROUTER`** nodes (planner, reflection, output selector) yield a
//!   [`Decision`](crate::Decision) and route through conditional edges.
//! - **`TOOL`** nodes invoke a capability and continue through their single
//!   unconditional edge. The terminal [`END`] marker is a `TOOL` node without
//!   a capability.
//!
//! # Example
//!
//! ```text
//!            ┌──── CALL_TOOL:Search ────▶ Search ──▶ reflection ──┐
//!            │                                                    │
//!   planner ◀┴────────────────────────────────────────────────────┘
//!      │
//!      └── FINISH ──▶ output ── OUTPUT:Report ──▶ Report ──▶ END
//! ```
//!
//! Definitions are plain serde structs and load from YAML or JSON:
//!
//! ```yaml
//! name: research
//! nodes:
//!   - { name: planner, kind: ROUTER, config: { category: planner } }
//!   - { name: Search, kind: TOOL, capability: web_search }
//! edges:
//!   - { source: planner, target: Search, condition: "CALL_TOOL:Search" }
//! ```

use crate::decision::DecisionKey;
use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Name of the entry node
pub const ENTRY_NODE: &str = "planner";

/// Name of the terminal node
pub const END: &str = "END";

/// Node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKind {
    Router,
    Tool,
}

/// Per-node configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Model selection for router nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Node category (`planner`, `reflection`, `output`, or free-form)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Retry budget hint for the output stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,

    /// Marks a terminal generator tool
    #[serde(default)]
    pub is_output_tool: bool,

    /// Ranking among alternative output tools (lower is preferred)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    /// Any other keys
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn output_tool(mut self) -> Self {
        self.is_output_tool = true;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Node definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique node name
    pub name: String,

    /// Display name, defaults to the node name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    pub kind: NodeKind,

    /// Opaque capability reference resolved through the tool registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,

    #[serde(default)]
    pub config: NodeConfig,
}

impl NodeDefinition {
    /// Create a router node
    pub fn router(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            config: NodeConfig::new().with_category(name.clone()),
            name,
            display_name: None,
            kind: NodeKind::Router,
            capability: None,
        }
    }

    /// Create a tool node whose capability has the same name
    pub fn tool(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            capability: Some(name.clone()),
            name,
            display_name: None,
            kind: NodeKind::Tool,
            config: NodeConfig::new(),
        }
    }

    /// Create the terminal node
    pub fn end() -> Self {
        Self {
            name: END.to_string(),
            display_name: None,
            kind: NodeKind::Tool,
            capability: None,
            config: NodeConfig::new(),
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    /// Name used to resolve the capability in the registry
    pub fn capability_name(&self) -> &str {
        self.capability.as_deref().unwrap_or(&self.name)
    }

    pub fn is_router(&self) -> bool {
        self.kind == NodeKind::Router
    }

    pub fn is_end(&self) -> bool {
        self.name == END
    }

    pub fn is_output_tool(&self) -> bool {
        self.kind == NodeKind::Tool && self.config.is_output_tool
    }

    /// Category, falling back to the node name
    pub fn category(&self) -> &str {
        self.config.category.as_deref().unwrap_or(&self.name)
    }
}

/// Edge definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub source: String,
    pub target: String,

    /// `None` for unconditional edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<DecisionKey>,
}

impl EdgeDefinition {
    pub fn unconditional(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: None,
        }
    }

    pub fn conditional(
        source: impl Into<String>,
        target: impl Into<String>,
        condition: DecisionKey,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            condition: Some(condition),
        }
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }
}

/// Complete graph definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,

    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

impl GraphDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add_edge(mut self, edge: EdgeDefinition) -> Self {
        self.edges.push(edge);
        self
    }

    /// Parse a definition from YAML (JSON is valid YAML)
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate the graph structure
    ///
    /// Checks that node names are unique, the entry node exists and is a
    /// router, every edge references known nodes, tool nodes have exactly one
    /// unconditional edge and no conditional ones, and no router has two
    /// edges for the same condition key.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for node in &self.nodes {
            if node.name.trim().is_empty() {
                return Err(GraphError::Validation("node name must not be empty".to_string()));
            }
            if !names.insert(node.name.as_str()) {
                return Err(GraphError::Validation(format!(
                    "duplicate node name '{}'",
                    node.name
                )));
            }
        }

        let entry = self
            .nodes
            .iter()
            .find(|n| n.name == ENTRY_NODE)
            .ok_or_else(|| GraphError::EntryNodeMissing(ENTRY_NODE.to_string()))?;
        if !entry.is_router() {
            return Err(GraphError::Validation(format!(
                "entry node '{}' must be a ROUTER",
                ENTRY_NODE
            )));
        }

        if let Some(end) = self.nodes.iter().find(|n| n.is_end()) {
            if end.is_router() {
                return Err(GraphError::Validation(format!("'{}' must be a TOOL node", END)));
            }
        }

        let mut unconditional: HashMap<&str, usize> = HashMap::new();
        let mut keys: HashSet<(&str, &DecisionKey)> = HashSet::new();

        for edge in &self.edges {
            if edge.source == END {
                return Err(GraphError::Validation(format!(
                    "'{}' cannot have outgoing edges",
                    END
                )));
            }
            let source = self.node(&edge.source).ok_or_else(|| {
                GraphError::Validation(format!("edge source '{}' is not a node", edge.source))
            })?;
            if edge.target != END && !names.contains(edge.target.as_str()) {
                return Err(GraphError::Validation(format!(
                    "edge target '{}' is not a node",
                    edge.target
                )));
            }

            match &edge.condition {
                Some(key) => {
                    if !source.is_router() {
                        return Err(GraphError::Validation(format!(
                            "TOOL node '{}' cannot have conditional edge '{}'",
                            source.name, key
                        )));
                    }
                    if !keys.insert((edge.source.as_str(), key)) {
                        return Err(GraphError::Validation(format!(
                            "duplicate condition '{}' on node '{}'",
                            key, source.name
                        )));
                    }
                }
                None => {
                    *unconditional.entry(edge.source.as_str()).or_default() += 1;
                }
            }
        }

        for (source, count) in &unconditional {
            if *count > 1 {
                return Err(GraphError::Validation(format!(
                    "node '{}' has {} unconditional edges",
                    source, count
                )));
            }
        }

        for node in self.nodes.iter().filter(|n| !n.is_router() && !n.is_end()) {
            if !unconditional.contains_key(node.name.as_str()) {
                return Err(GraphError::Validation(format!(
                    "TOOL node '{}' has no unconditional edge",
                    node.name
                )));
            }
        }

        Ok(())
    }

    pub fn node(&self, name: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.name == name)
    }
}
