// Black-box coverage of the exponential-backoff scenario and circuit
// breaker tripping, exercised through the crate's public API only.

use std::sync::atomic::{AtomicU32, Ordering};
use workflow_runtime::{RetryManager, RetryPolicy};

#[tokio::test]
async fn exponential_policy_retries_twice_then_succeeds() {
    let manager = RetryManager::new();
    let mut policy = RetryPolicy::documented_exponential_example();
    policy.name = "fast-exponential".into();
    policy.base_delay_ms = 1;
    policy.max_delay_ms = 10;
    manager.register_policy(policy.clone());
    manager.assign("wf", "flaky", policy.name.clone(), "standard");

    let calls = AtomicU32::new(0);
    let result: workflow_runtime::Result<&str> = manager
        .execute(
            "wf",
            "flaky",
            |_ctx| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(("transient failure".to_string(), None))
                    } else {
                        Ok("ok")
                    }
                }
            },
            None::<fn() -> std::future::Ready<std::result::Result<&str, (String, Option<String>)>>>,
        )
        .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausting_max_attempts_surfaces_recovery_exhausted_semantics() {
    let manager = RetryManager::new();
    let mut policy = RetryPolicy::default();
    policy.name = "always-fails".into();
    policy.base_delay_ms = 1;
    policy.max_delay_ms = 1;
    policy.max_attempts = 2;
    manager.register_policy(policy.clone());
    manager.assign("wf", "doomed", policy.name.clone(), "standard");

    let result: workflow_runtime::Result<()> = manager
        .execute(
            "wf",
            "doomed",
            |_ctx| async { Err::<(), _>(("boom".to_string(), None)) },
            None::<fn() -> std::future::Ready<std::result::Result<(), (String, Option<String>)>>>,
        )
        .await;

    assert!(result.is_err());
}
