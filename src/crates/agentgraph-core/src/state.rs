//! Per-execution runtime state
//!
//! [`RuntimeState`] is created once per execution, passed by reference to
//! every node, mutated only by the orchestrator, and serialized at every
//! checkpoint. It is never truncated mid-run.
//!
//! # Layout
//!
//! ```text
//! RuntimeState
//! ├── task_goal          immutable after construction
//! ├── action_history     append-only log of every tool invocation
//! ├── action_summaries   one bounded projection per action, prompt-sized
//! │      └── action_id ──────────────┐
//! ├── full_action_data   action_id ──▶ full payload
//! ├── todo               ordered, dependency-linked sub-tasks
//! ├── usage              counters
//! └── extensions         open map for forward-compatible data
//! ```
//!
//! # Data markers
//!
//! Summaries stay small by pointing at the full payload instead of copying
//! it. A tool input may contain the string `@data:<action_id>`; before the
//! tool runs, [`RuntimeState::resolve_markers`] swaps each such string for
//! the stored payload.

use crate::error::{CapabilityError, GraphError, Result};
use crate::tool::{ResultStatus, StructuredResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Current schema version of the serialized state
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Prefix of a full-data marker
pub const DATA_MARKER_PREFIX: &str = "@data:";

/// Size bounds applied to action summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryLimits {
    pub max_description_chars: usize,
    pub max_key_results: usize,
    pub max_key_result_chars: usize,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        Self {
            max_description_chars: 160,
            max_key_results: 5,
            max_key_result_chars: 200,
        }
    }
}

/// One tool invocation, as recorded in the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// `action_<sequence>`
    pub id: String,
    pub sequence: u64,
    /// Graph node that ran the tool
    pub node: String,
    pub tool: String,
    /// Input after marker resolution
    pub input: Value,
    pub status: ResultStatus,
    pub output: Value,
    pub output_type: String,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ActionRecord {
    pub fn succeeded(&self) -> bool {
        self.status != ResultStatus::Error
    }

    /// Marker that resolves to this action's full payload
    pub fn data_marker(&self) -> String {
        format!("{}{}", DATA_MARKER_PREFIX, self.id)
    }
}

/// Compact projection of an action for prompts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSummary {
    /// `summary_<sequence>`
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    /// One line, bounded
    pub description: String,
    pub key_results: Vec<String>,
    pub status: ResultStatus,
    /// Back-reference into `full_action_data`
    pub action_id: String,
    pub is_sufficient: bool,
}

impl ActionSummary {
    pub fn data_marker(&self) -> String {
        format!("{}{}", DATA_MARKER_PREFIX, self.action_id)
    }
}

/// Timing of a single invocation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionTiming {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl ActionTiming {
    pub fn new(started_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            started_at,
            duration,
        }
    }

    fn finished_at(&self) -> DateTime<Utc> {
        self.started_at
            + chrono::Duration::from_std(self.duration).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// Status of a sub-task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Done,
    Blocked,
}

/// Sub-task tracked by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub description: String,
    pub status: TodoStatus,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Ordered, dependency-linked list of sub-tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoList {
    items: Vec<TodoItem>,
}

impl TodoList {
    /// Append an item; every dependency must already be in the list
    pub fn add(
        &mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        depends_on: Vec<String>,
    ) -> Result<()> {
        let id = id.into();
        if self.get(&id).is_some() {
            return Err(GraphError::Validation(format!("duplicate todo id '{}'", id)));
        }
        if let Some(missing) = depends_on.iter().find(|dep| self.get(dep).is_none()) {
            return Err(GraphError::Validation(format!(
                "todo '{}' depends on unknown item '{}'",
                id, missing
            )));
        }
        self.items.push(TodoItem {
            id,
            description: description.into(),
            status: TodoStatus::Pending,
            depends_on,
        });
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&TodoItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Returns false when the id is unknown
    pub fn set_status(&mut self, id: &str, status: TodoStatus) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.status = status;
                true
            }
            None => false,
        }
    }

    /// First pending item whose dependencies are all done
    pub fn next_ready(&self) -> Option<&TodoItem> {
        self.items.iter().find(|item| {
            item.status == TodoStatus::Pending
                && item.depends_on.iter().all(|dep| {
                    self.get(dep)
                        .map(|d| d.status == TodoStatus::Done)
                        .unwrap_or(false)
                })
        })
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|item| item.status == TodoStatus::Done)
    }
}

/// Usage and telemetry counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub steps: u64,
    pub planner_calls: u64,
    pub reflection_calls: u64,
    pub output_router_calls: u64,
    pub tool_calls: u64,
    pub tool_failures: u64,
    pub output_attempts: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl UsageCounters {
    /// Count a router invocation by node category
    pub fn record_router(&mut self, category: &str) {
        match category {
            "reflection" => self.reflection_calls += 1,
            "output" => self.output_router_calls += 1,
            _ => self.planner_calls += 1,
        }
    }

    fn record_tokens(&mut self, metadata: &BTreeMap<String, Value>) {
        if let Some(n) = metadata.get("prompt_tokens").and_then(Value::as_u64) {
            self.prompt_tokens += n;
        }
        if let Some(n) = metadata.get("completion_tokens").and_then(Value::as_u64) {
            self.completion_tokens += n;
        }
    }
}

/// Mutable context threaded through every step of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    pub schema_version: u32,
    task_goal: String,
    /// Usage/persona preamble given at construction
    #[serde(default)]
    pub preamble: String,
    #[serde(default)]
    action_history: Vec<ActionRecord>,
    #[serde(default)]
    action_summaries: Vec<ActionSummary>,
    #[serde(default)]
    full_action_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub todo: TodoList,
    #[serde(default)]
    pub usage: UsageCounters,
    #[serde(default)]
    pub summary_limits: SummaryLimits,
    /// Forward-compatible untyped data
    #[serde(default)]
    pub extensions: BTreeMap<String, Value>,
}

impl RuntimeState {
    /// Build the initial state
    ///
    /// Pure: the same goal and preamble always produce an equal state.
    pub fn new(goal: impl Into<String>, preamble: impl Into<String>) -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            task_goal: goal.into().trim().to_string(),
            preamble: preamble.into(),
            action_history: Vec::new(),
            action_summaries: Vec::new(),
            full_action_data: BTreeMap::new(),
            todo: TodoList::default(),
            usage: UsageCounters::default(),
            summary_limits: SummaryLimits::default(),
            extensions: BTreeMap::new(),
        }
    }

    pub fn with_summary_limits(mut self, limits: SummaryLimits) -> Self {
        self.summary_limits = limits;
        self
    }

    pub fn task_goal(&self) -> &str {
        &self.task_goal
    }

    pub fn action_history(&self) -> &[ActionRecord] {
        &self.action_history
    }

    pub fn action_summaries(&self) -> &[ActionSummary] {
        &self.action_summaries
    }

    pub fn full_action_data(&self) -> &BTreeMap<String, Value> {
        &self.full_action_data
    }

    /// Full payload for an action id
    pub fn full_data(&self, action_id: &str) -> Option<&Value> {
        self.full_action_data.get(action_id)
    }

    pub fn last_action(&self) -> Option<&ActionRecord> {
        self.action_history.last()
    }

    /// Record a completed invocation and return its action id
    ///
    /// A result whose status is `error` is stored as a failed action.
    pub fn record_result(
        &mut self,
        node: &str,
        tool: &str,
        input: Value,
        result: StructuredResult,
        timing: ActionTiming,
    ) -> String {
        let sequence = self.next_sequence();
        let id = format!("action_{}", sequence);
        let error = result.is_error().then(|| result.output_text());

        self.full_action_data.insert(
            id.clone(),
            json!({
                "status": result.status,
                "output": result.output,
                "output_type": result.output_type,
                "raw_data": result.raw_data,
                "metadata": result.metadata,
            }),
        );

        self.push(ActionRecord {
            id: id.clone(),
            sequence,
            node: node.to_string(),
            tool: tool.to_string(),
            input,
            status: result.status,
            output: result.output,
            output_type: result.output_type,
            metrics: result.metrics,
            metadata: result.metadata,
            error,
            started_at: timing.started_at,
            finished_at: timing.finished_at(),
            duration_ms: timing.duration.as_millis() as u64,
        });
        id
    }

    /// Record a failed invocation and return its action id
    pub fn record_failure(
        &mut self,
        node: &str,
        tool: &str,
        input: Value,
        error: &CapabilityError,
        timing: ActionTiming,
    ) -> String {
        let sequence = self.next_sequence();
        let id = format!("action_{}", sequence);

        self.full_action_data.insert(
            id.clone(),
            json!({
                "status": ResultStatus::Error,
                "error": error.message,
                "error_kind": error.kind,
            }),
        );

        self.push(ActionRecord {
            id: id.clone(),
            sequence,
            node: node.to_string(),
            tool: tool.to_string(),
            input,
            status: ResultStatus::Error,
            output: Value::Null,
            output_type: "error".to_string(),
            metrics: Vec::new(),
            metadata: BTreeMap::new(),
            error: Some(error.message.clone()),
            started_at: timing.started_at,
            finished_at: timing.finished_at(),
            duration_ms: timing.duration.as_millis() as u64,
        });
        id
    }

    /// Replace every exact `@data:<action_id>` string with the stored payload
    ///
    /// Unknown ids are left in place.
    pub fn resolve_markers(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => match s.strip_prefix(DATA_MARKER_PREFIX) {
                Some(action_id) => match self.full_action_data.get(action_id) {
                    Some(data) => data.clone(),
                    None => {
                        tracing::warn!(action_id, "Unresolved data marker");
                        value.clone()
                    }
                },
                None => value.clone(),
            },
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve_markers(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_markers(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.action_history.len() as u64 + 1
    }

    fn push(&mut self, record: ActionRecord) {
        self.usage.tool_calls += 1;
        if !record.succeeded() {
            self.usage.tool_failures += 1;
        }
        self.usage.record_tokens(&record.metadata);

        let summary = self.summarize(&record);
        self.action_summaries.push(summary);
        self.action_history.push(record);
    }

    fn summarize(&self, record: &ActionRecord) -> ActionSummary {
        let limits = self.summary_limits;

        let description = match (record.metadata.get("description"), &record.error) {
            (Some(Value::String(d)), _) => d.clone(),
            (_, Some(error)) => format!("{} failed: {}", record.tool, error),
            _ => format!("{} returned {}", record.tool, record.output_type),
        };
        let description = truncate_chars(first_line(&description), limits.max_description_chars);

        let mut key_results: Vec<String> = record
            .metrics
            .iter()
            .take(limits.max_key_results)
            .map(|m| truncate_chars(m, limits.max_key_result_chars))
            .collect();
        if key_results.is_empty() && !record.output.is_null() && limits.max_key_results > 0 {
            let text = match &record.output {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            key_results.push(truncate_chars(&text, limits.max_key_result_chars));
        }

        let is_sufficient = record
            .metadata
            .get("is_sufficient")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        ActionSummary {
            id: format!("summary_{}", record.sequence),
            timestamp: record.finished_at,
            tool: record.tool.clone(),
            description,
            key_results,
            status: record.status,
            action_id: record.id.clone(),
            is_sufficient,
        }
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("")
}

/// Truncate to at most `max` chars, never splitting a code point
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
