//! Step kinds and step file naming
//!
//! | Step                | File                          |
//! |---------------------|-------------------------------|
//! | planner router      | `<n>_planner.json`            |
//! | reflection router   | `<n>_reflection.json`         |
//! | output router       | `<n>_output.json`             |
//! | regular tool        | `<n>_call_tool_<tool>.json`   |
//! | output tool         | `<n>_output_<tool>.json`      |
//! | terminal node       | `<n>_end.json`                |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a checkpointed step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    /// Router step, named by router category
    Router(String),
    CallTool(String),
    OutputTool(String),
    End,
}

impl StepKind {
    pub fn planner() -> Self {
        Self::Router("planner".to_string())
    }

    pub fn reflection() -> Self {
        Self::Router("reflection".to_string())
    }

    pub fn output() -> Self {
        Self::Router("output".to_string())
    }

    /// Node kind as written into the file name
    pub fn file_kind(&self) -> String {
        match self {
            StepKind::Router(category) => sanitize(category),
            StepKind::CallTool(tool) => format!("call_tool_{}", sanitize(tool)),
            StepKind::OutputTool(tool) => format!("output_{}", sanitize(tool)),
            StepKind::End => "end".to_string(),
        }
    }

    /// Coarse node type recorded in `node_types_executed`
    pub fn node_type(&self) -> String {
        match self {
            StepKind::Router(category) => sanitize(category),
            StepKind::CallTool(_) => "call_tool".to_string(),
            StepKind::OutputTool(_) => "output_tool".to_string(),
            StepKind::End => "end".to_string(),
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        match self {
            StepKind::CallTool(tool) | StepKind::OutputTool(tool) => Some(tool),
            _ => None,
        }
    }

    pub fn file_name(&self, step_number: u64) -> String {
        format!("{}_{}.json", step_number, self.file_kind())
    }
}

/// Replace characters that are unsafe in a file name
pub(crate) fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Step number encoded in a step file name, if it is one
///
/// Temporary files and non-step documents yield `None`.
pub fn parse_step_number(file_name: &str) -> Option<u64> {
    let stem = file_name.strip_suffix(".json")?;
    let (number, kind) = stem.split_once('_')?;
    if kind.is_empty() || number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

/// Body of a step file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_number: u64,
    pub node_kind: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}
