// Black-box coverage of the Recovery Manager's category-to-strategy
// dispatch, exercised through the crate's public API only.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use workflow_runtime::engine::error_category::ErrorCategory;
use workflow_runtime::engine::recovery::{RecoveryAction, RecoveryOutcome, TransactionManager};
use workflow_runtime::{CheckpointManager, RecoveryManager, RetryManager, RuntimeError, StateScope, StateStore, Value};

fn make_recovery_manager(store: Arc<StateStore>) -> RecoveryManager {
    let checkpoints = Arc::new(CheckpointManager::new(store));
    let transactions = TransactionManager::new(checkpoints);
    let retry_manager = Arc::new(RetryManager::new());
    RecoveryManager::new(retry_manager, transactions)
}

#[tokio::test]
async fn logical_error_rolls_back_state_to_the_checkpoint() {
    let store = StateStore::new();
    store.declare("state_version", Value::Number(1.0), StateScope::Workflow).await.unwrap();
    let recovery = make_recovery_manager(Arc::clone(&store));

    let outcome = recovery
        .with_recovery(
            "wf",
            "bump-version",
            {
                let store = Arc::clone(&store);
                move || {
                    let store = Arc::clone(&store);
                    async move {
                        store.set_value("state_version", Value::Number(2.0)).await?;
                        Err::<(), _>(RuntimeError::Internal("assertion failed: invalid transition".into()))
                    }
                }
            },
            None::<fn() -> std::future::Ready<workflow_runtime::Result<()>>>,
            None,
        )
        .await;

    assert!(matches!(outcome, RecoveryOutcome::Failed(_)));
    assert_eq!(store.get("state_version").await, Some(Value::Number(1.0)));
}

#[tokio::test]
async fn dependency_error_retries_by_default() {
    // spec.md §7: DEPENDENCY defaults to retry, not alternate-path.
    let store = StateStore::new();
    let recovery = make_recovery_manager(store);
    let calls = AtomicU32::new(0);

    let outcome = recovery
        .with_recovery(
            "wf",
            "call-remote",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(RuntimeError::Internal("connection refused by peer".into()))
                    } else {
                        Ok(-1)
                    }
                }
            },
            None::<fn() -> std::future::Ready<workflow_runtime::Result<i32>>>,
            None,
        )
        .await;

    assert!(matches!(outcome, RecoveryOutcome::Succeeded(-1)));
}

#[tokio::test]
async fn dependency_error_falls_back_to_an_alternate_path_when_overridden() {
    let store = StateStore::new();
    let mut recovery = make_recovery_manager(store);
    recovery.override_action(ErrorCategory::Dependency, RecoveryAction::AlternatePath);

    let outcome = recovery
        .with_recovery(
            "wf",
            "call-remote",
            || async { Err::<i32, _>(RuntimeError::Internal("connection refused by peer".into())) },
            Some(|| async { Ok::<i32, RuntimeError>(-1) }),
            None,
        )
        .await;

    assert!(matches!(outcome, RecoveryOutcome::Succeeded(-1)));
}
