// Black-box coverage of the State Store's mutation ordering, permissions,
// and change feed, exercised through the crate's public API only.

use workflow_runtime::{RuntimeError, StateScope, StateStore, Value};

#[tokio::test]
async fn get_reflects_the_last_successful_write() {
    let store = StateStore::new();
    store.declare("count", Value::Number(1.0), StateScope::Workflow).await.unwrap();
    store.set_value("count", Value::Number(2.0)).await.unwrap();
    store.set_value("count", Value::Number(3.0)).await.unwrap();
    assert_eq!(store.get("count").await, Some(Value::Number(3.0)));
}

#[tokio::test]
async fn a_failed_write_leaves_the_value_unchanged() {
    let store = StateStore::new();
    store.declare("count", Value::Number(1.0), StateScope::Workflow).await.unwrap();
    let err = store.set_value("count", Value::String("oops".into())).await.unwrap_err();
    assert!(matches!(err, RuntimeError::ValidationFailed { .. }));
    assert_eq!(store.get("count").await, Some(Value::Number(1.0)));
}

#[tokio::test]
async fn every_successful_mutation_emits_exactly_one_change_event() {
    let store = StateStore::new();
    let mut rx = store.subscribe();

    store.declare("x", Value::Number(1.0), StateScope::Workflow).await.unwrap();
    let created = rx.recv().await.unwrap();
    assert_eq!(created.old_value, None);
    assert_eq!(created.new_value, Some(Value::Number(1.0)));

    store.set_value("x", Value::Number(2.0)).await.unwrap();
    let updated = rx.recv().await.unwrap();
    assert_eq!(updated.old_value, Some(Value::Number(1.0)));
    assert_eq!(updated.new_value, Some(Value::Number(2.0)));
}

#[tokio::test]
async fn export_state_round_trips_through_a_fresh_store_via_declare() {
    let original = StateStore::new();
    original.declare("x", Value::Number(10.0), StateScope::Workflow).await.unwrap();
    original.declare("y", Value::String("hello".into()), StateScope::Global).await.unwrap();

    let snapshot = original.export_state().await;

    let restored = StateStore::new();
    for (name, value) in snapshot {
        restored.declare(name, value, StateScope::Workflow).await.unwrap();
    }
    assert_eq!(restored.get("x").await, Some(Value::Number(10.0)));
    assert_eq!(restored.get("y").await, Some(Value::String("hello".into())));
}

/// spec.md §8(e): "a variable with ttl=1s is absent after 1.1s."
#[tokio::test]
async fn a_variable_with_ttl_1s_is_absent_after_1_1s() {
    let store = StateStore::new();
    store
        .declare_with_ttl("otp", Value::String("123456".into()), StateScope::Session, 1)
        .await
        .unwrap();
    assert_eq!(store.get("otp").await, Some(Value::String("123456".into())));

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    assert_eq!(store.get("otp").await, None);
}
