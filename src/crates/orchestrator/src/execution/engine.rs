//! The execution loop
//!
//! [`Orchestrator::run`] walks the graph from the entry node until `END`:
//!
//! 1. Check the step and time ceilings
//! 2. Check the phase transition for the next node
//! 3. Router nodes ask the [`DecisionProvider`] for a decision and follow
//!    the matching conditional edge
//! 4. Tool nodes invoke their capability, record the result (or failure)
//!    into the runtime state and follow their unconditional edge
//! 5. Output tools run through the [`OutputToolExecutor`], falling back to
//!    alternative output tools of the output router
//! 6. `END` is checkpointed and the workflow is marked completed
//!
//! Every node commits one step file. Tool nodes and termination also write
//! a whole-state snapshot.

use super::phase::Phase;
use crate::config::EngineConfig;
use crate::executor::{try_alternative_tool, OutputCandidate, OutputToolExecutor};
use crate::logging::format_elapsed;
use crate::{OrchestratorError, Result};
use agentgraph_checkpoint::{FileCheckpointStore, StepKind, WorkflowStatus};
use agentgraph_core::{
    ActionTiming, DecisionKind, DecisionProvider, GraphStore, NodeDefinition, RuntimeState,
    ToolRegistry,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_USER: &str = "default_user";
pub const DEFAULT_SESSION: &str = "default_session";

/// Input of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub task_id: String,
    pub user_id: String,
    pub session_id: String,
    pub goal: String,
    #[serde(default)]
    pub preamble: String,
}

impl ExecutionRequest {
    /// Request with a fresh task id and the default user and session
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            user_id: DEFAULT_USER.to_string(),
            session_id: DEFAULT_SESSION.to_string(),
            goal: goal.into(),
            preamble: String::new(),
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }
}

/// Result of a finished execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub task_id: String,
    pub status: WorkflowStatus,
    /// Node names in execution order
    pub visited: Vec<String>,
    /// Committed step files
    pub steps: u64,
    pub final_output: Option<Value>,
    pub failure: Option<Value>,
    pub state: RuntimeState,
}

impl ExecutionOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }
}

/// Mutable bookkeeping of one run
struct RunContext {
    task_id: String,
    state: RuntimeState,
    visited: Vec<String>,
    steps: u64,
    phase: Option<Phase>,
    pending_input: Value,
    output_router: Option<String>,
    final_output: Option<Value>,
    started: Instant,
}

impl RunContext {
    fn into_outcome(self, status: WorkflowStatus, failure: Option<Value>) -> ExecutionOutcome {
        ExecutionOutcome {
            task_id: self.task_id,
            status,
            visited: self.visited,
            steps: self.steps,
            final_output: self.final_output,
            failure,
            state: self.state,
        }
    }
}

/// How the loop stopped without a fatal error
enum Termination {
    Completed,
    OutputExhausted(Value),
}

enum OutputStage {
    Next(String),
    Exhausted(Value),
}

/// Drives executions over a read-only graph
///
/// Cloning is cheap; every clone shares the graph, registry, provider and
/// checkpoint store.
#[derive(Clone)]
pub struct Orchestrator {
    graph: Arc<dyn GraphStore>,
    tools: Arc<ToolRegistry>,
    provider: Arc<dyn DecisionProvider>,
    checkpoints: FileCheckpointStore,
    config: Arc<EngineConfig>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tools", &self.tools)
            .field("checkpoints", &self.checkpoints)
            .field("config", &self.config)
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator writing checkpoints under
    /// `config.checkpoint_root`
    pub fn new(
        graph: Arc<dyn GraphStore>,
        tools: ToolRegistry,
        provider: Arc<dyn DecisionProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            checkpoints: FileCheckpointStore::new(config.checkpoint_root.clone()),
            graph,
            tools: Arc::new(tools),
            provider,
            config: Arc::new(config),
        }
    }

    /// Replace the checkpoint store, e.g. to attach task records
    pub fn with_checkpoint_store(mut self, checkpoints: FileCheckpointStore) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn checkpoints(&self) -> &FileCheckpointStore {
        &self.checkpoints
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one execution to termination
    ///
    /// Fails fast on structural errors (unknown node, unmatched decision,
    /// unregistered tool, invalid transition) and on the safety ceilings.
    /// In every such case the workflow is marked failed before the error is
    /// returned. Exhausting all output tools is not an error: the outcome
    /// carries status `failed` and the failure trace.
    pub async fn run(&self, request: ExecutionRequest) -> Result<ExecutionOutcome> {
        self.checkpoints
            .create_workflow_directory(&request.task_id, &request.user_id, &request.session_id)
            .await?;

        let mut run = RunContext {
            task_id: request.task_id,
            state: RuntimeState::new(request.goal, request.preamble)
                .with_summary_limits(self.config.summary_limits),
            visited: Vec::new(),
            steps: 0,
            phase: None,
            pending_input: Value::Null,
            output_router: None,
            final_output: None,
            started: Instant::now(),
        };
        info!(task_id = %run.task_id, goal = %run.state.task_goal(), "Starting execution");

        match self.drive(&mut run).await {
            Ok(Termination::Completed) => {
                info!(
                    task_id = %run.task_id,
                    steps = run.steps,
                    elapsed = %format_elapsed(run.started.elapsed()),
                    "Execution completed"
                );
                Ok(run.into_outcome(WorkflowStatus::Completed, None))
            }
            Ok(Termination::OutputExhausted(failure)) => {
                error!(task_id = %run.task_id, "All output tools failed");
                Ok(run.into_outcome(WorkflowStatus::Failed, Some(failure)))
            }
            Err(e) => {
                error!(task_id = %run.task_id, error = %e, "Execution failed");
                self.mark_failed(&run, json!({ "reason": e.to_string() }))
                    .await;
                Err(e)
            }
        }
    }

    async fn drive(&self, run: &mut RunContext) -> Result<Termination> {
        let mut current = self.graph.get_entry_node()?.name.clone();

        loop {
            self.check_ceilings(run)?;

            let node = self.graph.get_node(&current)?;
            let phase = Phase::of(node);
            Phase::check_transition(run.phase, phase)?;
            run.phase = Some(phase);
            run.visited.push(node.name.clone());
            run.state.usage.steps += 1;
            debug!(task_id = %run.task_id, node = %node.name, phase = %phase, "Entering node");

            current = match phase {
                Phase::Terminated => {
                    self.finish(run).await?;
                    return Ok(Termination::Completed);
                }
                Phase::FinalizingOutputTool => match self.run_output_stage(run, node).await? {
                    OutputStage::Next(next) => next,
                    OutputStage::Exhausted(failure) => {
                        self.checkpoints
                            .update_status(&run.task_id, WorkflowStatus::Failed, Some(failure.clone()))
                            .await?;
                        self.snapshot(run).await;
                        return Ok(Termination::OutputExhausted(failure));
                    }
                },
                Phase::ExecutingTool => self.run_tool(run, node).await?,
                Phase::Planning | Phase::Reflecting | Phase::Outputting => {
                    if phase == Phase::Outputting {
                        run.output_router = Some(node.name.clone());
                    }
                    self.run_router(run, node).await?
                }
            };
        }
    }

    fn check_ceilings(&self, run: &RunContext) -> Result<()> {
        if run.visited.len() as u64 >= self.config.max_steps {
            return Err(OrchestratorError::StepLimitExceeded {
                task_id: run.task_id.clone(),
                limit: self.config.max_steps,
            });
        }
        if let Some(budget) = self.config.max_duration() {
            if run.started.elapsed() > budget {
                return Err(OrchestratorError::TimeBudgetExceeded {
                    task_id: run.task_id.clone(),
                    budget_secs: budget.as_secs(),
                });
            }
        }
        Ok(())
    }

    async fn run_router(&self, run: &mut RunContext, node: &NodeDefinition) -> Result<String> {
        run.state.usage.record_router(node.category());
        let decision = self.provider.decide(node, &run.state).await?;
        info!(
            task_id = %run.task_id,
            node = %node.name,
            decision = %decision.tag(),
            "Router decided"
        );

        let record = json!({ "node": node.name, "decision": decision });
        self.commit(run, StepKind::Router(node.category().to_string()), &record)
            .await;

        let next = self.graph.next_node(&node.name, decision.key().as_ref())?;
        run.pending_input = decision.tool_input().cloned().unwrap_or(Value::Null);
        Ok(next)
    }

    async fn run_tool(&self, run: &mut RunContext, node: &NodeDefinition) -> Result<String> {
        let tool = node.capability_name();
        let capability = self.tools.resolve(tool)?;
        let input = run.state.resolve_markers(&std::mem::take(&mut run.pending_input));

        let started_at = Utc::now();
        let clock = Instant::now();
        let outcome = capability.invoke(&run.state, input.clone(), &node.config).await;
        let timing = ActionTiming::new(started_at, clock.elapsed());

        let action_id = match outcome {
            Ok(result) => {
                if result.is_error() {
                    warn!(task_id = %run.task_id, tool = %tool, "Tool reported an error result");
                }
                run.state.record_result(&node.name, tool, input, result, timing)
            }
            Err(e) => {
                warn!(task_id = %run.task_id, tool = %tool, error = %e, "Tool invocation failed");
                run.state.record_failure(&node.name, tool, input, &e, timing)
            }
        };
        debug!(
            task_id = %run.task_id,
            tool = %tool,
            action_id = %action_id,
            duration = %format_elapsed(timing.duration),
            "Recorded tool action"
        );

        let record = serde_json::to_value(run.state.last_action())?;
        self.commit(run, StepKind::CallTool(node.name.clone()), &record)
            .await;
        self.snapshot(run).await;

        Ok(self.graph.next_node(&node.name, None)?)
    }

    /// Run the chosen output tool, then alternatives until one succeeds
    async fn run_output_stage(
        &self,
        run: &mut RunContext,
        node: &NodeDefinition,
    ) -> Result<OutputStage> {
        let candidates = run
            .output_router
            .as_deref()
            .map(|router| self.output_candidates(router))
            .unwrap_or_default();
        let input = run.state.resolve_markers(&std::mem::take(&mut run.pending_input));
        let mut failed: Vec<String> = Vec::new();
        let mut attempts: Vec<Value> = Vec::new();
        let mut current = node;

        loop {
            let tool = current.capability_name();
            let capability = self.tools.resolve(tool)?;
            let mut executor =
                OutputToolExecutor::new(self.config.output_retry.for_node(&current.config));

            let started_at = Utc::now();
            let clock = Instant::now();
            let outcome = executor
                .execute_with_retry(
                    capability.as_ref(),
                    tool,
                    &run.state,
                    input.clone(),
                    &current.config,
                    &run.task_id,
                )
                .await;
            let history = executor.history();
            run.state.usage.output_attempts += history.len() as u64;

            match outcome {
                Ok(success) => {
                    let final_output = success.result.output.clone();
                    let timing = ActionTiming::new(started_at, clock.elapsed());
                    let action_id = run.state.record_result(
                        &current.name,
                        tool,
                        input.clone(),
                        success.result,
                        timing,
                    );
                    let record = json!({
                        "action_id": action_id,
                        "result": run.state.last_action(),
                        "recovered": success.recovered,
                        "retry_history": history,
                        "alternatives_tried": failed,
                    });
                    self.commit(run, StepKind::OutputTool(current.name.clone()), &record)
                        .await;
                    self.snapshot(run).await;
                    run.final_output = Some(final_output);
                    info!(
                        task_id = %run.task_id,
                        tool = %tool,
                        attempts = success.attempts,
                        recovered = success.recovered,
                        "Output tool succeeded"
                    );
                    return Ok(OutputStage::Next(self.graph.next_node(&current.name, None)?));
                }
                Err(failure) => {
                    warn!(
                        task_id = %run.task_id,
                        tool = %tool,
                        classification = %failure.kind,
                        attempts = failure.attempts,
                        "Output tool failed"
                    );
                    failed.push(current.name.clone());
                    let entry = json!({ "failure": failure, "retry_history": history });
                    let record = json!({
                        "status": "error",
                        "failure": failure,
                        "retry_history": history,
                        "alternatives_tried": failed,
                    });
                    self.commit(run, StepKind::OutputTool(current.name.clone()), &record)
                        .await;
                    attempts.push(entry);

                    match try_alternative_tool(&candidates, &failed) {
                        Some(alternative) => {
                            info!(
                                task_id = %run.task_id,
                                failed = %current.name,
                                alternative = %alternative.name,
                                "Falling back to alternative output tool"
                            );
                            current = self.graph.get_node(&alternative.name)?;
                            run.visited.push(current.name.clone());
                            run.state.usage.steps += 1;
                        }
                        None => {
                            return Ok(OutputStage::Exhausted(json!({
                                "reason": "output tools exhausted",
                                "tools_tried": failed,
                                "attempts": attempts,
                            })));
                        }
                    }
                }
            }
        }
    }

    /// Output tools reachable from the output router, in declaration order
    ///
    /// Priority comes from the node config and defaults to the edge index.
    fn output_candidates(&self, router: &str) -> Vec<OutputCandidate> {
        self.graph
            .get_edges(router)
            .into_iter()
            .filter(|e| {
                e.condition
                    .as_ref()
                    .map(|k| k.kind == DecisionKind::EmitOutput)
                    .unwrap_or(false)
            })
            .enumerate()
            .filter_map(|(index, edge)| {
                let node = self.graph.get_node(&edge.target).ok()?;
                node.is_output_tool().then(|| {
                    OutputCandidate::new(
                        node.name.clone(),
                        node.config.priority.unwrap_or(index as i64),
                    )
                })
            })
            .collect()
    }

    async fn finish(&self, run: &mut RunContext) -> Result<()> {
        let record = json!({
            "status": WorkflowStatus::Completed,
            "final_output": run.final_output,
        });
        self.commit(run, StepKind::End, &record).await;
        self.snapshot(run).await;
        self.checkpoints
            .update_status(&run.task_id, WorkflowStatus::Completed, None)
            .await?;

        if self.config.persist_final_snapshot {
            match self.checkpoints.task_records() {
                Some(records) => {
                    records
                        .save_state_snapshot(&run.task_id, serde_json::to_value(&run.state)?)
                        .await?;
                    debug!(task_id = %run.task_id, "Persisted final state to task record");
                }
                None => warn!(
                    task_id = %run.task_id,
                    "persist_final_snapshot is set but no task-record store is attached"
                ),
            }
        }
        Ok(())
    }

    /// Commit the next step file; the step counter only advances on success
    async fn commit<T: Serialize + ?Sized>(
        &self,
        run: &mut RunContext,
        kind: StepKind,
        output: &T,
    ) -> bool {
        let step = run.steps + 1;
        let saved = self
            .checkpoints
            .save_step(&run.task_id, step, &kind, output)
            .await;
        if saved {
            run.steps = step;
        } else {
            warn!(task_id = %run.task_id, step, node_kind = %kind.file_kind(), "Step not checkpointed");
        }
        saved
    }

    async fn snapshot(&self, run: &RunContext) {
        if let Err(e) = self.checkpoints.save(&run.task_id, &run.state).await {
            warn!(task_id = %run.task_id, error = %e, "Failed to save state snapshot");
        }
    }

    async fn mark_failed(&self, run: &RunContext, failure: Value) {
        if let Err(e) = self
            .checkpoints
            .update_status(&run.task_id, WorkflowStatus::Failed, Some(failure))
            .await
        {
            warn!(task_id = %run.task_id, error = %e, "Failed to mark workflow as failed");
        }
        self.snapshot(run).await;
    }
}
