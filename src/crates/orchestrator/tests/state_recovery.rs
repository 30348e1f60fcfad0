mod common;

use agentgraph_checkpoint::{FileCheckpointStore, InMemoryTaskRecords, TaskRecordStore};
use common::*;
use orchestrator::{ExecutionRequest, Orchestrator, SqliteTaskRecords};
use std::sync::Arc;

#[tokio::test]
async fn test_final_snapshot_loads_from_checkpoint_directory() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        research_graph(),
        registry(),
        Arc::new(SearchThenReport { searches: 2 }),
        engine_config(dir.path()),
    );
    let outcome = orchestrator
        .run(ExecutionRequest::new("persist me").with_task_id("persisted"))
        .await
        .unwrap();

    // A fresh store has no cached directories and must scan the root
    let loaded = FileCheckpointStore::new(dir.path())
        .load_with_fallback("persisted")
        .await
        .unwrap();
    assert_eq!(loaded.source, "timestamped_snapshot");
    assert_eq!(loaded.state.task_goal(), outcome.state.task_goal());
    assert_eq!(loaded.state.action_history(), outcome.state.action_history());
    assert_eq!(loaded.state.full_action_data(), outcome.state.full_action_data());
}

#[tokio::test]
async fn test_final_snapshot_persisted_to_task_records() {
    let dir = tempfile::tempdir().unwrap();
    let records = InMemoryTaskRecords::new();
    let store = FileCheckpointStore::new(dir.path()).with_task_records(Arc::new(records.clone()));
    let orchestrator = Orchestrator::new(
        research_graph(),
        registry(),
        Arc::new(SearchThenReport { searches: 1 }),
        engine_config(dir.path()).with_persist_final_snapshot(true),
    )
    .with_checkpoint_store(store);

    let outcome = orchestrator
        .run(ExecutionRequest::new("keep a copy").with_task_id("recorded"))
        .await
        .unwrap();
    assert!(records.state_snapshot("recorded").await.unwrap().is_some());

    // With the checkpoint tree gone only the task record remains
    std::fs::remove_dir_all(dir.path()).unwrap();
    let loaded = FileCheckpointStore::new(dir.path())
        .with_task_records(Arc::new(records))
        .load_with_fallback("recorded")
        .await
        .unwrap();
    assert_eq!(loaded.source, "task_record");
    assert_eq!(loaded.state, outcome.state);
}

#[tokio::test]
async fn test_sqlite_task_records_back_the_last_tier() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tasks.db");
    let url = format!("sqlite:{}?mode=rwc", db_path.display());
    let records = Arc::new(SqliteTaskRecords::connect(&url).await.unwrap());

    let root = dir.path().join("checkpoints");
    let orchestrator = Orchestrator::new(
        research_graph(),
        registry(),
        Arc::new(SearchThenReport { searches: 1 }),
        engine_config(&root).with_persist_final_snapshot(true),
    )
    .with_checkpoint_store(FileCheckpointStore::new(&root).with_task_records(records.clone()));

    let outcome = orchestrator
        .run(ExecutionRequest::new("sqlite copy").with_task_id("sqlite-task"))
        .await
        .unwrap();
    let row = records.get("sqlite-task").await.unwrap().unwrap();
    assert_eq!(row.status, "completed");

    std::fs::remove_dir_all(&root).unwrap();
    let loaded = FileCheckpointStore::new(&root)
        .with_task_records(records)
        .load_with_fallback("sqlite-task")
        .await
        .unwrap();
    assert_eq!(loaded.source, "task_record");
    assert_eq!(loaded.state.task_goal(), "sqlite copy");
    assert_eq!(loaded.state.action_history(), outcome.state.action_history());
}

#[tokio::test]
async fn test_sqlite_status_tracks_failed_run() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("tasks.db").display());
    let records = Arc::new(SqliteTaskRecords::connect(&url).await.unwrap());

    let root = dir.path().join("checkpoints");
    let orchestrator = Orchestrator::new(
        research_graph(),
        registry(),
        Arc::new(SearchThenReport { searches: 3 }),
        engine_config(&root).with_max_steps(4),
    )
    .with_checkpoint_store(FileCheckpointStore::new(&root).with_task_records(records.clone()));

    orchestrator
        .run(ExecutionRequest::new("too long").with_task_id("capped"))
        .await
        .unwrap_err();

    let row = records.get("capped").await.unwrap().unwrap();
    assert_eq!(row.status, "failed");
    // The failure snapshot stays in the checkpoint tree
    assert!(row.state_snapshot.is_none());
}
