//! Typed routing decisions emitted by router nodes
//!
//! A router node (planner, reflection, output selector) never produces side
//! effects. It produces a [`Decision`], and the orchestrator turns that
//! decision into the next node by looking up a [`DecisionKey`] in the edge
//! map. The string forms (`CALL_TOOL:<name>`, `FINISH`, `OUTPUT:<name>`) are
//! kept only as the serialized representation of a key.
//!
//! ```text
//! Decision::CallTool { tool: "Search", .. }  ──key──▶  (CallTool, Some("Search"))
//! Decision::Finish { .. }                    ──key──▶  (Finish, None)
//! Decision::EmitOutput { tool: "Report", .. }──key──▶  (EmitOutput, Some("Report"))
//! Decision::Continue { .. }                  ──────▶  unconditional edge
//! ```

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Kind of a conditional routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    /// Invoke a regular tool
    CallTool,
    /// Stop planning and move to the output stage
    Finish,
    /// Produce the final answer with an output tool
    EmitOutput,
}

/// Condition key on an edge, matched against a router decision
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DecisionKey {
    pub kind: DecisionKind,
    pub tool: Option<String>,
}

impl DecisionKey {
    pub fn call_tool(tool: impl Into<String>) -> Self {
        Self {
            kind: DecisionKind::CallTool,
            tool: Some(tool.into()),
        }
    }

    pub fn finish() -> Self {
        Self {
            kind: DecisionKind::Finish,
            tool: None,
        }
    }

    pub fn emit_output(tool: impl Into<String>) -> Self {
        Self {
            kind: DecisionKind::EmitOutput,
            tool: Some(tool.into()),
        }
    }
}

impl fmt::Display for DecisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.tool) {
            (DecisionKind::CallTool, Some(tool)) => write!(f, "CALL_TOOL:{}", tool),
            (DecisionKind::EmitOutput, Some(tool)) => write!(f, "OUTPUT:{}", tool),
            (DecisionKind::Finish, _) => write!(f, "FINISH"),
            (DecisionKind::CallTool, None) => write!(f, "CALL_TOOL"),
            (DecisionKind::EmitOutput, None) => write!(f, "OUTPUT"),
        }
    }
}

impl FromStr for DecisionKey {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed == "FINISH" {
            return Ok(Self::finish());
        }

        let (tag, tool) = trimmed
            .split_once(':')
            .ok_or_else(|| GraphError::InvalidConditionKey(s.to_string()))?;
        let tool = tool.trim();
        if tool.is_empty() {
            return Err(GraphError::InvalidConditionKey(s.to_string()));
        }

        match tag.trim() {
            "CALL_TOOL" => Ok(Self::call_tool(tool)),
            "OUTPUT" => Ok(Self::emit_output(tool)),
            _ => Err(GraphError::InvalidConditionKey(s.to_string())),
        }
    }
}

impl TryFrom<String> for DecisionKey {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DecisionKey> for String {
    fn from(key: DecisionKey) -> Self {
        key.to_string()
    }
}

/// Decision emitted by a router node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Invoke a tool with the given input
    CallTool {
        tool: String,
        #[serde(default)]
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guidance: Option<String>,
    },

    /// Planning is done; hand over to the output stage
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guidance: Option<String>,
    },

    /// Produce the final answer with the named output tool
    EmitOutput {
        tool: String,
        #[serde(default)]
        input: Value,
    },

    /// No routing choice; follow the router's unconditional edge
    Continue {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guidance: Option<String>,
    },
}

impl Decision {
    pub fn call_tool(tool: impl Into<String>, input: Value) -> Self {
        Self::CallTool {
            tool: tool.into(),
            input,
            guidance: None,
        }
    }

    pub fn finish() -> Self {
        Self::Finish { guidance: None }
    }

    pub fn emit_output(tool: impl Into<String>, input: Value) -> Self {
        Self::EmitOutput {
            tool: tool.into(),
            input,
        }
    }

    pub fn proceed() -> Self {
        Self::Continue { guidance: None }
    }

    /// Edge key for conditional routing, `None` for [`Decision::Continue`]
    pub fn key(&self) -> Option<DecisionKey> {
        match self {
            Decision::CallTool { tool, .. } => Some(DecisionKey::call_tool(tool.clone())),
            Decision::Finish { .. } => Some(DecisionKey::finish()),
            Decision::EmitOutput { tool, .. } => Some(DecisionKey::emit_output(tool.clone())),
            Decision::Continue { .. } => None,
        }
    }

    /// Input to hand to the next tool node, if any
    pub fn tool_input(&self) -> Option<&Value> {
        match self {
            Decision::CallTool { input, .. } | Decision::EmitOutput { input, .. } => Some(input),
            _ => None,
        }
    }

    /// Rendered tag used in logs and checkpoints
    pub fn tag(&self) -> String {
        self.key()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "CONTINUE".to_string())
    }
}
