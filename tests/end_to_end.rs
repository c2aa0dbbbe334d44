// The six concrete end-to-end scenarios this runtime is built to satisfy,
// each with the literal inputs its originating specification names.

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use workflow_runtime::engine::recovery::{RecoveryOutcome, TransactionManager};
use workflow_runtime::{
    CheckpointManager, ConditionEvaluator, ProgressTracker, RecoveryManager, RetryManager,
    RetryPolicy, RuntimeError, StateScope, StateStore, StreamingService, Value,
};

/// 1. State round-trip: create x=10 (scope=workflow); snapshot; load into a
/// fresh store; expect get_value("x") == 10.
#[tokio::test]
async fn state_round_trip() {
    let original = StateStore::new();
    original.declare("x", Value::Number(10.0), StateScope::Workflow).await.unwrap();

    let snapshot = original.export_state().await;
    let fresh = StateStore::new();
    for (name, value) in snapshot {
        fresh.declare(name, value, StateScope::Workflow).await.unwrap();
    }

    assert_eq!(fresh.get("x").await, Some(Value::Number(10.0)));
}

/// 2. Retry exponential: fn fails twice with a transient error then
/// returns "ok"; policy as documented; expect result "ok" after exactly 3
/// attempts.
#[tokio::test]
async fn retry_exponential_succeeds_on_third_attempt() {
    let manager = RetryManager::new();
    let mut policy = RetryPolicy::documented_exponential_example();
    policy.name = "e2e-exponential".into();
    policy.base_delay_ms = 1;
    policy.max_delay_ms = 5;
    manager.register_policy(policy.clone());
    manager.assign("wf", "step", policy.name.clone(), "standard");

    let calls = std::sync::atomic::AtomicU32::new(0);
    let result: workflow_runtime::Result<&str> = manager
        .execute(
            "wf",
            "step",
            |_ctx| {
                let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(("transient".to_string(), None))
                    } else {
                        Ok("ok")
                    }
                }
            },
            None::<fn() -> std::future::Ready<std::result::Result<&str, (String, Option<String>)>>>,
        )
        .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
}

/// 3. Rollback on logical error: create state_version=1; checkpoint; set
/// state_version=2; fail inside a transaction; expect state_version == 1
/// and the recovery outcome to be a failure (rollback already applied by
/// the transaction manager).
#[tokio::test]
async fn rollback_on_logical_error() {
    let store = StateStore::new();
    store.declare("state_version", Value::Number(1.0), StateScope::Workflow).await.unwrap();

    let checkpoints = Arc::new(CheckpointManager::new(Arc::clone(&store)));
    let transactions = TransactionManager::new(checkpoints);
    let retry_manager = Arc::new(RetryManager::new());
    let recovery = RecoveryManager::new(retry_manager, transactions);

    let outcome = recovery
        .with_recovery(
            "wf",
            "step",
            {
                let store = Arc::clone(&store);
                move || {
                    let store = Arc::clone(&store);
                    async move {
                        store.set_value("state_version", Value::Number(2.0)).await?;
                        Err::<(), _>(RuntimeError::Internal("assertion failed: invalid state".into()))
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

/// 4. Progress rollup: workflow W with steps S1 (weight 1, percent 100) and
/// S2 (weight 3, percent 0); expect W.percent == 25.
#[tokio::test]
async fn progress_rollup() {
    let tracker = ProgressTracker::new(None);
    let workflow = tracker.create_workflow("W", 1.0).await;
    let s1 = tracker.create_step(&workflow, &workflow, "S1", 1.0).await.unwrap();
    let s2 = tracker.create_step(&workflow, &workflow, "S2", 3.0).await.unwrap();

    tracker.start_item(&s1).await.unwrap();
    tracker.update_progress(&s1, 100.0, None).await.unwrap();
    tracker.start_item(&s2).await.unwrap();
    tracker.update_progress(&s2, 0.0, None).await.unwrap();

    let state = tracker.get_workflow_progress(&workflow).await.unwrap();
    assert_eq!(state.percent_complete, 25.0);
}

/// 5. Condition evaluator: `contains(tags, "urgent") and length(items) > 0`
/// with tags=["urgent","new"], items=[1,2] -> true; with items=[] -> false.
#[tokio::test]
async fn condition_evaluator_tags_and_items() {
    let evaluator = ConditionEvaluator::new();
    let expr = r#"contains(tags, "urgent") and length(items) > 0"#;
    let mut vars = HashMap::new();
    vars.insert("tags".to_string(), Value::List(vec![Value::String("urgent".into()), Value::String("new".into())]));
    vars.insert("items".to_string(), Value::List(vec![Value::Number(1.0), Value::Number(2.0)]));

    assert_eq!(evaluator.evaluate_bool(expr, &vars).unwrap(), true);

    vars.insert("items".to_string(), Value::List(vec![]));
    assert_eq!(evaluator.evaluate_bool(expr, &vars).unwrap(), false);
}

/// 6. SSE streaming: source yields 3 chunks; response emits events in
/// order started, chunk, chunk, chunk, complete; each data: line is valid
/// JSON with a monotonically increasing id.
#[tokio::test]
async fn sse_streaming_event_order_and_ids() {
    let service = StreamingService::new(None);
    let source = futures::stream::iter(vec![serde_json::json!("a"), serde_json::json!("b"), serde_json::json!("c")]);
    let (_id, stream) = service.create_sse_response(source, None, "demo");
    let frames: Vec<String> = stream.collect().await;

    assert_eq!(frames.len(), 5);
    let events: Vec<&str> = frames
        .iter()
        .map(|f| f.lines().find(|l| l.starts_with("event: ")).unwrap().trim_start_matches("event: "))
        .collect();
    assert_eq!(events, vec!["started", "chunk", "chunk", "chunk", "complete"]);

    let ids: Vec<u64> = frames
        .iter()
        .map(|f| {
            f.lines()
                .find(|l| l.starts_with("id: "))
                .unwrap()
                .trim_start_matches("id: ")
                .parse()
                .unwrap()
        })
        .collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);

    for frame in &frames {
        let data_line = frame.lines().find(|l| l.starts_with("data: ")).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&data_line["data: ".len()..]).is_ok());
    }
}
