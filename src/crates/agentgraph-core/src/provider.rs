//! Decision providers for router nodes
//!
//! Prompt rendering and model calls live behind [`DecisionProvider`]. The
//! orchestrator hands a router node and the current state to the provider
//! and receives a typed [`Decision`].
//!
//! [`ScriptedProvider`] replays a fixed sequence of decisions per router
//! category. It backs tests and dry runs.

use crate::decision::Decision;
use crate::error::{GraphError, Result};
use crate::graph::NodeDefinition;
use crate::state::RuntimeState;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Produces the routing decision for a router node
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn decide(&self, node: &NodeDefinition, state: &RuntimeState) -> Result<Decision>;
}

/// Provider replaying queued decisions keyed by router category
///
/// A category with an empty queue yields [`Decision::Continue`].
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    queues: Mutex<HashMap<String, VecDeque<Decision>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue decisions for routers of the given category
    pub fn with_script(
        self,
        category: impl Into<String>,
        decisions: impl IntoIterator<Item = Decision>,
    ) -> Self {
        if let Ok(mut queues) = self.queues.lock() {
            queues
                .entry(category.into())
                .or_default()
                .extend(decisions);
        }
        self
    }

    /// Decisions still queued for a category
    pub fn remaining(&self, category: &str) -> usize {
        self.queues
            .lock()
            .map(|q| q.get(category).map(VecDeque::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl DecisionProvider for ScriptedProvider {
    async fn decide(&self, node: &NodeDefinition, _state: &RuntimeState) -> Result<Decision> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| GraphError::decision(&node.name, "script lock poisoned"))?;
        let next = queues
            .get_mut(node.category())
            .and_then(VecDeque::pop_front);
        Ok(next.unwrap_or_else(Decision::proceed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_provider_replays_in_order() {
        let provider = ScriptedProvider::new().with_script(
            "planner",
            [Decision::call_tool("Search", json!({"q": "a"})), Decision::finish()],
        );
        let planner = NodeDefinition::router("planner");
        let reflection = NodeDefinition::router("reflection");
        let state = RuntimeState::new("goal", "");

        assert_eq!(
            provider.decide(&planner, &state).await.unwrap().tag(),
            "CALL_TOOL:Search"
        );
        assert_eq!(provider.remaining("planner"), 1);
        assert_eq!(provider.decide(&planner, &state).await.unwrap(), Decision::finish());

        // Exhausted and unknown categories fall through
        assert_eq!(provider.decide(&planner, &state).await.unwrap(), Decision::proceed());
        assert_eq!(
            provider.decide(&reflection, &state).await.unwrap(),
            Decision::proceed()
        );
    }
}
