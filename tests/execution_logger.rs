// Black-box coverage of the execution log's active-then-persisted
// lifecycle, exercised through the crate's public API only.

use workflow_runtime::models::{ExecutionStatus, StateScope, Value};
use workflow_runtime::{ExecutionLogger, StateStore};

#[tokio::test]
async fn a_completed_execution_is_queryable_after_eviction_from_active() {
    let dir = std::env::temp_dir().join(format!("wfr_exec_logger_test_{}", uuid::Uuid::new_v4()));
    let logger = ExecutionLogger::new(&dir);
    let store = StateStore::new();
    store.declare("input", Value::Number(1.0), StateScope::Workflow).await.unwrap();

    let execution_id = logger.create_execution("wf-1", "demo", &store).await;
    logger.start(&execution_id).await.unwrap();
    logger.log_step_start(&execution_id, "fetch").unwrap();
    logger.log_step_end(&execution_id, "fetch", 5.0).unwrap();
    logger.complete(&execution_id, &store).await.unwrap();

    let record = logger.get(&execution_id).await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.aggregates.step_count, 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn a_failed_execution_records_its_failure_reason() {
    let dir = std::env::temp_dir().join(format!("wfr_exec_logger_test_{}", uuid::Uuid::new_v4()));
    let logger = ExecutionLogger::new(&dir);
    let store = StateStore::new();

    let execution_id = logger.create_execution("wf-1", "demo", &store).await;
    logger.start(&execution_id).await.unwrap();
    logger.fail(&execution_id, "step unrecoverable").await.unwrap();

    let record = logger.get(&execution_id).await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);

    let _ = std::fs::remove_dir_all(&dir);
}
