mod common;

use agentgraph_checkpoint::WorkflowStatus;
use common::*;
use futures::future::join_all;
use orchestrator::{ExecutionRequest, Orchestrator};
use std::sync::Arc;
use std::time::Duration;

fn build_orchestrator(root: &std::path::Path) -> Orchestrator {
    Orchestrator::new(
        research_graph(),
        registry(),
        Arc::new(SearchThenReport { searches: 2 }),
        engine_config(root),
    )
}

#[tokio::test]
async fn test_dropping_the_handle_does_not_cancel_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = build_orchestrator(dir.path());

    let handle = orchestrator.spawn_execution(ExecutionRequest::new("detached").with_task_id("detached"));
    assert_eq!(handle.task_id(), "detached");
    drop(handle);

    let store = orchestrator.checkpoints();
    let mut status = None;
    for _ in 0..500 {
        if let Ok(metadata) = store.load_metadata("detached").await {
            if metadata.workflow_status != WorkflowStatus::Running {
                status = Some(metadata.workflow_status);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, Some(WorkflowStatus::Completed));
    assert_eq!(store.step_count("detached").await.unwrap(), 10);
}

#[tokio::test]
async fn test_concurrent_runs_keep_separate_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = build_orchestrator(dir.path());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            orchestrator.spawn_execution(
                ExecutionRequest::new(format!("goal {}", i))
                    .with_task_id(format!("task-{}", i))
                    .with_user("alice")
                    .with_session("s1"),
            )
        })
        .collect();

    let outcomes = join_all(handles.into_iter().map(|h| h.wait())).await;
    for (i, outcome) in outcomes.into_iter().enumerate() {
        let outcome = outcome.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.task_id, format!("task-{}", i));
        assert_eq!(outcome.state.task_goal(), format!("goal {}", i));
        assert_eq!(outcome.steps, 10);
    }

    let session_dir = dir.path().join("alice").join("s1");
    let dirs = std::fs::read_dir(session_dir).unwrap().count();
    assert_eq!(dirs, 4);
}
