#![allow(dead_code)]

use agentgraph_core::{
    Capability, CapabilityError, CapabilityResult, Decision, DecisionProvider, FnCapability,
    GraphStore, InMemoryGraphStore, NodeConfig, NodeDefinition, RuntimeState, StructuredResult,
    ToolRegistry,
};
use async_trait::async_trait;
use orchestrator::{EngineConfig, OutputRetrySettings};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const RESEARCH_GRAPH: &str = r#"
name: research
nodes:
  - { name: planner, kind: ROUTER }
  - { name: Search, kind: TOOL, capability: web_search }
  - { name: reflection, kind: ROUTER }
  - { name: output, kind: ROUTER }
  - { name: Report, kind: TOOL, capability: report, config: { is_output_tool: true, priority: 1 } }
  - { name: Summary, kind: TOOL, capability: summary, config: { is_output_tool: true, priority: 2 } }
edges:
  - { source: planner, target: Search, condition: "CALL_TOOL:Search" }
  - { source: planner, target: output, condition: FINISH }
  - { source: Search, target: reflection }
  - { source: reflection, target: planner }
  - { source: output, target: Report, condition: "OUTPUT:Report" }
  - { source: output, target: Summary, condition: "OUTPUT:Summary" }
  - { source: Report, target: END }
  - { source: Summary, target: END }
"#;

pub fn research_graph() -> Arc<dyn GraphStore> {
    Arc::new(InMemoryGraphStore::from_yaml_str(RESEARCH_GRAPH).unwrap())
}

/// Engine config rooted in a temp dir, without output backoff delays
pub fn engine_config(root: &Path) -> EngineConfig {
    EngineConfig::default()
        .with_checkpoint_root(root)
        .with_output_retry(OutputRetrySettings::default().with_backoff_delays(vec![Duration::ZERO]))
}

pub fn search_tool() -> FnCapability {
    FnCapability::new(|_state, input, _config| {
        Ok(StructuredResult::success(json!({ "hits": 3, "query": input["q"] }))
            .with_output_type("search_results")
            .with_metric("3 hits"))
    })
}

pub fn output_tool(text: &'static str) -> FnCapability {
    FnCapability::new(move |_state, _input, _config| {
        Ok(StructuredResult::success(json!(text)).with_output_type("markdown"))
    })
}

/// Registry with working search, report and summary tools
pub fn registry() -> ToolRegistry {
    ToolRegistry::new()
        .with("web_search", search_tool())
        .with("report", output_tool("# Report"))
        .with("summary", output_tool("summary text"))
}

/// Capability failing with queued errors before succeeding
pub struct Flaky {
    errors: Mutex<VecDeque<CapabilityError>>,
    output: Value,
    calls: Arc<AtomicUsize>,
}

impl Flaky {
    pub fn new(errors: Vec<&str>, output: Value) -> Self {
        Self {
            errors: Mutex::new(errors.into_iter().map(CapabilityError::new).collect()),
            output,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fails every call with the same message
    pub fn always(message: &str) -> Self {
        Self::new(vec![message; 64], Value::Null)
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Capability for Flaky {
    async fn invoke(&self, _: &RuntimeState, _: Value, _: &NodeConfig) -> CapabilityResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.errors.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(StructuredResult::success(self.output.clone())),
        }
    }
}

/// Capability that sleeps before answering
pub struct Slow(pub Duration);

#[async_trait]
impl Capability for Slow {
    async fn invoke(&self, _: &RuntimeState, input: Value, _: &NodeConfig) -> CapabilityResult {
        tokio::time::sleep(self.0).await;
        Ok(StructuredResult::success(input))
    }
}

/// Stateless policy: search `searches` times, then finish with the report
pub struct SearchThenReport {
    pub searches: usize,
}

#[async_trait]
impl DecisionProvider for SearchThenReport {
    async fn decide(
        &self,
        node: &NodeDefinition,
        state: &RuntimeState,
    ) -> agentgraph_core::Result<Decision> {
        Ok(match node.category() {
            "planner" if state.action_history().len() < self.searches => {
                Decision::call_tool("Search", json!({ "q": state.task_goal() }))
            }
            "planner" => Decision::finish(),
            "output" => Decision::emit_output("Report", json!({ "format": "markdown" })),
            _ => Decision::proceed(),
        })
    }
}

/// Names of the step files in a task directory, ordered by step number
pub async fn step_file_names(
    store: &agentgraph_checkpoint::FileCheckpointStore,
    task_id: &str,
) -> Vec<String> {
    store
        .list_step_files(task_id)
        .await
        .unwrap()
        .into_iter()
        .map(|(_, path)| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}
