// Black-box coverage of capture/restore round-tripping through disk
// persistence, exercised through the crate's public API only.

use std::sync::Arc;
use workflow_runtime::{CheckpointManager, CheckpointType, StateScope, StateStore, Value};

#[tokio::test]
async fn restore_after_disk_persistence_recreates_a_fresh_store() {
    let dir = std::env::temp_dir().join(format!("wfr_checkpoint_test_{}", uuid::Uuid::new_v4()));

    let store = StateStore::new();
    store.declare("x", Value::Number(10.0), StateScope::Workflow).await.unwrap();
    let manager = CheckpointManager::new(Arc::clone(&store)).with_disk_persistence(&dir);
    let checkpoint = manager.capture("wf-1", None, CheckpointType::Manual).await.unwrap();

    let restored_store = StateStore::new();
    let restored_manager = CheckpointManager::new(Arc::clone(&restored_store)).with_disk_persistence(&dir);
    restored_manager.restore(&checkpoint.id).await.unwrap();

    assert_eq!(restored_store.get("x").await, Some(Value::Number(10.0)));
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn restore_preserves_variables_absent_from_the_checkpoint() {
    let store = StateStore::new();
    store.declare("kept", Value::Bool(true), StateScope::Workflow).await.unwrap();
    let manager = CheckpointManager::new(Arc::clone(&store));
    let checkpoint = manager.capture("wf-1", None, CheckpointType::Auto).await.unwrap();

    store.declare("not_in_snapshot", Value::Number(5.0), StateScope::Workflow).await.unwrap();
    manager.restore(&checkpoint.id).await.unwrap();

    assert_eq!(store.get("kept").await, Some(Value::Bool(true)));
    assert_eq!(store.get("not_in_snapshot").await, Some(Value::Number(5.0)));
}
