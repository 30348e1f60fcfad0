mod common;

use agentgraph_checkpoint::{CheckpointError, WorkflowStatus};
use agentgraph_core::{
    Decision, GraphError, InMemoryGraphStore, ResultStatus, ScriptedProvider, ToolRegistry,
};
use common::*;
use orchestrator::{ExecutionRequest, Orchestrator, OrchestratorError};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn research_script() -> ScriptedProvider {
    ScriptedProvider::new()
        .with_script(
            "planner",
            vec![
                Decision::call_tool("Search", json!({ "q": "rust async runtimes" })),
                Decision::call_tool("Search", json!({ "q": "@data:action_1" })),
                Decision::finish(),
            ],
        )
        .with_script(
            "output",
            vec![Decision::emit_output("Report", json!({ "format": "markdown" }))],
        )
}

#[tokio::test]
async fn test_research_run_visits_and_checkpoints_every_node() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        research_graph(),
        registry(),
        Arc::new(research_script()),
        engine_config(dir.path()),
    );

    let outcome = orchestrator
        .run(ExecutionRequest::new("compare rust async runtimes").with_task_id("scenario-a"))
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert_eq!(
        outcome.visited,
        vec![
            "planner", "Search", "reflection", "planner", "Search", "reflection", "planner",
            "output", "Report", "END",
        ]
    );
    assert_eq!(outcome.steps, 10);
    assert_eq!(outcome.final_output, Some(json!("# Report")));

    let store = orchestrator.checkpoints();
    assert_eq!(
        step_file_names(store, "scenario-a").await,
        vec![
            "1_planner.json",
            "2_call_tool_Search.json",
            "3_reflection.json",
            "4_planner.json",
            "5_call_tool_Search.json",
            "6_reflection.json",
            "7_planner.json",
            "8_output.json",
            "9_output_Report.json",
            "10_end.json",
        ]
    );

    // Gapless numbering matches the metadata count
    let numbers: Vec<u64> = store
        .list_step_files("scenario-a")
        .await
        .unwrap()
        .into_iter()
        .map(|(n, _)| n)
        .collect();
    assert_eq!(numbers, (1..=10).collect::<Vec<u64>>());

    let metadata = store.load_metadata("scenario-a").await.unwrap();
    assert_eq!(metadata.total_steps, 10);
    assert_eq!(metadata.workflow_status, WorkflowStatus::Completed);
    assert!(metadata.node_types_executed.contains(&"call_tool".to_string()));
    assert!(metadata.node_types_executed.contains(&"end".to_string()));

    let state = &outcome.state;
    assert_eq!(state.action_history().len(), 3);
    assert_eq!(state.action_summaries().len(), 3);
    assert_eq!(state.usage.planner_calls, 3);
    assert_eq!(state.usage.reflection_calls, 2);
    assert_eq!(state.usage.output_router_calls, 1);
    assert_eq!(state.usage.output_attempts, 1);
}

#[tokio::test]
async fn test_data_markers_resolve_into_tool_input() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        research_graph(),
        registry(),
        Arc::new(research_script()),
        engine_config(dir.path()),
    );

    let outcome = orchestrator
        .run(ExecutionRequest::new("markers").with_task_id("markers"))
        .await
        .unwrap();

    let history = outcome.state.action_history();
    let first_payload = outcome.state.full_data("action_1").unwrap();
    assert_eq!(&history[1].input["q"], first_payload);
    assert_eq!(history[1].input["q"]["output"]["hits"], 3);
}

#[tokio::test]
async fn test_tool_failure_is_recorded_and_flows_to_reflection() {
    let dir = tempfile::tempdir().unwrap();
    let search = Flaky::always("connection refused");
    let calls = search.calls();
    let tools = ToolRegistry::new()
        .with("web_search", search)
        .with("report", output_tool("# Report"))
        .with("summary", output_tool("summary"));
    let provider = ScriptedProvider::new()
        .with_script(
            "planner",
            vec![Decision::call_tool("Search", json!({ "q": "x" })), Decision::finish()],
        )
        .with_script("output", vec![Decision::emit_output("Report", json!({}))]);

    let orchestrator =
        Orchestrator::new(research_graph(), tools, Arc::new(provider), engine_config(dir.path()));
    let outcome = orchestrator
        .run(ExecutionRequest::new("failing search").with_task_id("tool-failure"))
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(&outcome.visited[..3], &["planner", "Search", "reflection"]);
    // No retries outside the output stage
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let failed = &outcome.state.action_history()[0];
    assert_eq!(failed.status, ResultStatus::Error);
    assert_eq!(failed.error.as_deref(), Some("connection refused"));
    assert_eq!(outcome.state.usage.tool_failures, 1);
    assert!(outcome.state.action_summaries()[0]
        .description
        .contains("connection refused"));
}

#[tokio::test]
async fn test_unmatched_decision_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let provider = ScriptedProvider::new().with_script(
        "planner",
        vec![Decision::call_tool("Unknown", json!({}))],
    );
    let orchestrator = Orchestrator::new(
        research_graph(),
        registry(),
        Arc::new(provider),
        engine_config(dir.path()),
    );

    let err = orchestrator
        .run(ExecutionRequest::new("bad route").with_task_id("no-edge"))
        .await
        .unwrap_err();
    match err {
        OrchestratorError::Graph(GraphError::NoMatchingEdge { node, decision }) => {
            assert_eq!(node, "planner");
            assert_eq!(decision, "CALL_TOOL:Unknown");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let metadata = orchestrator.checkpoints().load_metadata("no-edge").await.unwrap();
    assert_eq!(metadata.workflow_status, WorkflowStatus::Failed);
    assert!(metadata.failure.unwrap()["reason"]
        .as_str()
        .unwrap()
        .contains("CALL_TOOL:Unknown"));
    // The planner step itself was checkpointed before routing failed
    assert_eq!(metadata.total_steps, 1);
}

#[tokio::test]
async fn test_unregistered_tool_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let tools = ToolRegistry::new().with("report", output_tool("# Report"));
    let orchestrator = Orchestrator::new(
        research_graph(),
        tools,
        Arc::new(SearchThenReport { searches: 1 }),
        engine_config(dir.path()),
    );

    let err = orchestrator
        .run(ExecutionRequest::new("missing tool").with_task_id("no-tool"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Graph(GraphError::ToolNotFound { ref name, .. }) if name == "web_search"
    ));
}

#[tokio::test]
async fn test_transition_outside_phase_diagram_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let graph = InMemoryGraphStore::from_yaml_str(
        r#"
name: shortcut
nodes:
  - { name: planner, kind: ROUTER }
edges:
  - { source: planner, target: END, condition: FINISH }
"#,
    )
    .unwrap();
    let provider = ScriptedProvider::new().with_script("planner", vec![Decision::finish()]);
    let orchestrator = Orchestrator::new(
        Arc::new(graph),
        ToolRegistry::new(),
        Arc::new(provider),
        engine_config(dir.path()),
    );

    let err = orchestrator
        .run(ExecutionRequest::new("skip output").with_task_id("shortcut"))
        .await
        .unwrap_err();
    match err {
        OrchestratorError::Graph(GraphError::InvalidTransition { from, to }) => {
            assert_eq!(from, "PLANNING");
            assert_eq!(to, "TERMINATED");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_step_ceiling_stops_endless_planning() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        research_graph(),
        registry(),
        Arc::new(SearchThenReport { searches: usize::MAX }),
        engine_config(dir.path()).with_max_steps(5),
    );

    let err = orchestrator
        .run(ExecutionRequest::new("never done").with_task_id("ceiling"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::StepLimitExceeded { limit: 5, .. }
    ));

    let store = orchestrator.checkpoints();
    let metadata = store.load_metadata("ceiling").await.unwrap();
    assert_eq!(metadata.workflow_status, WorkflowStatus::Failed);
    assert_eq!(metadata.total_steps, 5);
    assert!(metadata.failure.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_time_budget_stops_slow_runs() {
    let dir = tempfile::tempdir().unwrap();
    let tools = ToolRegistry::new()
        .with("web_search", Slow(Duration::from_secs(2)))
        .with("report", output_tool("# Report"))
        .with("summary", output_tool("summary"));
    let orchestrator = Orchestrator::new(
        research_graph(),
        tools,
        Arc::new(SearchThenReport { searches: usize::MAX }),
        engine_config(dir.path()).with_max_duration(Duration::from_secs(1)),
    );

    let err = orchestrator
        .run(ExecutionRequest::new("slow").with_task_id("budget"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::TimeBudgetExceeded { budget_secs: 1, .. }
    ));
    let metadata = orchestrator.checkpoints().load_metadata("budget").await.unwrap();
    assert_eq!(metadata.workflow_status, WorkflowStatus::Failed);
}

#[tokio::test]
async fn test_unsafe_task_id_is_rejected_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        research_graph(),
        registry(),
        Arc::new(SearchThenReport { searches: 1 }),
        engine_config(dir.path()),
    );

    let err = orchestrator
        .run(ExecutionRequest::new("escape").with_task_id("../outside"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Checkpoint(_)));
}

#[tokio::test]
async fn test_reused_task_id_leaves_first_run_intact() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        research_graph(),
        registry(),
        Arc::new(SearchThenReport { searches: 1 }),
        engine_config(dir.path()),
    );

    let first = orchestrator
        .run(ExecutionRequest::new("first").with_task_id("dup"))
        .await
        .unwrap();
    assert!(first.is_completed());

    let err = orchestrator
        .run(ExecutionRequest::new("second").with_task_id("dup"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Checkpoint(CheckpointError::AlreadyExists(_))
    ));

    let metadata = orchestrator.checkpoints().load_metadata("dup").await.unwrap();
    assert_eq!(metadata.workflow_status, WorkflowStatus::Completed);
    assert_eq!(metadata.total_steps, first.steps);
    assert_eq!(
        step_file_names(orchestrator.checkpoints(), "dup").await.len() as u64,
        first.steps
    );
}
