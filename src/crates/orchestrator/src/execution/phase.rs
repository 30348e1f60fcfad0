//! Execution phases and the allowed transitions between them

use agentgraph_core::{GraphError, NodeDefinition};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a running execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Planning,
    ExecutingTool,
    Reflecting,
    Outputting,
    FinalizingOutputTool,
    Terminated,
}

impl Phase {
    /// Phase entered when the given node runs
    pub fn of(node: &NodeDefinition) -> Self {
        if node.is_end() {
            Phase::Terminated
        } else if node.is_output_tool() {
            Phase::FinalizingOutputTool
        } else if !node.is_router() {
            Phase::ExecutingTool
        } else {
            match node.category() {
                "reflection" => Phase::Reflecting,
                "output" => Phase::Outputting,
                _ => Phase::Planning,
            }
        }
    }

    pub fn can_transition_to(&self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Planning, ExecutingTool)
                | (Planning, Outputting)
                | (ExecutingTool, Reflecting)
                | (Reflecting, Planning)
                | (Reflecting, Outputting)
                | (Outputting, FinalizingOutputTool)
                | (FinalizingOutputTool, Terminated)
        )
    }

    /// Check a move from `current` (`None` before the first node)
    pub fn check_transition(current: Option<Phase>, next: Phase) -> Result<(), GraphError> {
        match current {
            None if next == Phase::Planning => Ok(()),
            Some(from) if from.can_transition_to(next) => Ok(()),
            _ => Err(GraphError::InvalidTransition {
                from: current
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "START".to_string()),
                to: next.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "PLANNING",
            Phase::ExecutingTool => "EXECUTING_TOOL",
            Phase::Reflecting => "REFLECTING",
            Phase::Outputting => "OUTPUTTING",
            Phase::FinalizingOutputTool => "FINALIZING_OUTPUT_TOOL",
            Phase::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
