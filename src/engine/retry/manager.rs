// RetryManager: named policy/strategy registries, per-(workflow, step)
// overrides, circuit breaking, and the actual attempt loop.
//
// Grounded in `original_source/core/retry_system.py`'s RetryManager class
// and its module-level `with_retry` helper.

use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::engine::error_category::{ErrorCategorizer, ErrorCategory};
use crate::models::RetryPolicyConfig;
use crate::{Result, RuntimeError};

use super::circuit_breaker::CircuitBreaker;
use super::monitor::{RetryMonitor, RetryMonitorRecord};
use super::policy::delay_for;
use super::strategy::RetryStrategyKind;

/// What an operation closure is told about the attempt it's about to make.
#[derive(Debug, Clone, Copy)]
pub struct RetryAttemptContext {
    pub attempt: u32,
    pub degraded: bool,
}

/// Central retry coordination: named policies, named strategies, explicit
/// per-(workflow, step) assignments (falling back to a default policy when
/// unassigned), circuit breakers keyed by policy name, and attempt history.
pub struct RetryManager {
    policies: DashMap<String, RetryPolicyConfig>,
    strategies: DashMap<String, RetryStrategyKind>,
    assignments: DashMap<(String, String), (String, String)>,
    circuit_breakers: DashMap<String, Arc<CircuitBreaker>>,
    monitor: RetryMonitor,
    categorizer: ErrorCategorizer,
}

impl Default for RetryManager {
    fn default() -> Self {
        let manager = RetryManager {
            policies: DashMap::new(),
            strategies: DashMap::new(),
            assignments: DashMap::new(),
            circuit_breakers: DashMap::new(),
            monitor: RetryMonitor::new(),
            categorizer: ErrorCategorizer::new(),
        };
        manager.register_policy(RetryPolicyConfig::default());
        manager.register_strategy("standard", RetryStrategyKind::Standard);
        manager
    }
}

impl RetryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_policy(&self, policy: RetryPolicyConfig) {
        self.policies.insert(policy.name.clone(), policy);
    }

    pub fn register_strategy(&self, name: impl Into<String>, kind: RetryStrategyKind) {
        self.strategies.insert(name.into(), kind);
    }

    pub fn assign(
        &self,
        workflow_id: impl Into<String>,
        step_id: impl Into<String>,
        policy_name: impl Into<String>,
        strategy_name: impl Into<String>,
    ) {
        self.assignments.insert(
            (workflow_id.into(), step_id.into()),
            (policy_name.into(), strategy_name.into()),
        );
    }

    pub fn monitor(&self) -> &RetryMonitor {
        &self.monitor
    }

    fn resolve(&self, workflow_id: &str, step_id: &str) -> (RetryPolicyConfig, RetryStrategyKind) {
        let (policy_name, strategy_name) = self
            .assignments
            .get(&(workflow_id.to_string(), step_id.to_string()))
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| ("default".to_string(), "standard".to_string()));
        let policy = self
            .policies
            .get(&policy_name)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let strategy = self
            .strategies
            .get(&strategy_name)
            .map(|entry| *entry.value())
            .unwrap_or(RetryStrategyKind::Standard);
        (policy, strategy)
    }

    fn circuit_breaker_for(&self, policy: &RetryPolicyConfig) -> Option<Arc<CircuitBreaker>> {
        let threshold = policy.circuit_breaker_threshold?;
        let recovery_ms = policy.circuit_breaker_recovery_ms.unwrap_or(30_000);
        Some(
            self.circuit_breakers
                .entry(policy.name.clone())
                .or_insert_with(|| {
                    Arc::new(CircuitBreaker::new(
                        policy.name.clone(),
                        threshold,
                        Duration::from_millis(recovery_ms),
                    ))
                })
                .clone(),
        )
    }

    /// Run `operation` under the policy/strategy assigned to
    /// `(workflow_id, step_id)` (or the default policy/standard strategy if
    /// none was assigned), retrying on failure per the resolved policy.
    ///
    /// `operation` receives a [`RetryAttemptContext`] each call so
    /// `GradualDegradation` strategies can adjust their own behavior (e.g.
    /// request a cheaper/smaller unit of work) once degradation kicks in.
    /// If the strategy is [`RetryStrategyKind::Failover`] and every attempt
    /// against `operation` fails, `fallback` (if provided) is tried once
    /// before giving up.
    pub async fn execute<F, Fut, Fb, FbFut, T>(
        &self,
        workflow_id: &str,
        step_id: &str,
        mut operation: F,
        fallback: Option<Fb>,
    ) -> Result<T>
    where
        F: FnMut(RetryAttemptContext) -> Fut,
        Fut: Future<Output = std::result::Result<T, (String, Option<String>)>>,
        Fb: FnOnce() -> FbFut,
        FbFut: Future<Output = std::result::Result<T, (String, Option<String>)>>,
    {
        let (policy, strategy) = self.resolve(workflow_id, step_id);
        let breaker = self.circuit_breaker_for(&policy);

        let mut last_error: Option<(String, Option<ErrorCategory>)> = None;
        for attempt in 1..=policy.max_attempts {
            if let Some(breaker) = &breaker {
                breaker.check()?;
            }

            let ctx = RetryAttemptContext {
                attempt,
                degraded: strategy.should_degrade(attempt),
            };

            match operation(ctx).await {
                Ok(value) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_success();
                    }
                    self.monitor.record(RetryMonitorRecord {
                        workflow_id: workflow_id.to_string(),
                        step_id: step_id.to_string(),
                        policy_name: policy.name.clone(),
                        attempt,
                        succeeded: true,
                        category: None,
                        delay_ms: 0,
                        recorded_at: chrono::Utc::now(),
                    });
                    return Ok(value);
                }
                Err((message, type_name)) => {
                    let category = self.categorizer.categorize(&message, type_name.as_deref());
                    if let Some(breaker) = &breaker {
                        breaker.record_failure();
                    }
                    let delay = delay_for(&policy, attempt);
                    self.monitor.record(RetryMonitorRecord {
                        workflow_id: workflow_id.to_string(),
                        step_id: step_id.to_string(),
                        policy_name: policy.name.clone(),
                        attempt,
                        succeeded: false,
                        category: Some(category),
                        delay_ms: delay,
                        recorded_at: chrono::Utc::now(),
                    });
                    warn!(workflow_id, step_id, attempt, %message, ?category, "retry attempt failed");
                    last_error = Some((message, Some(category)));
                    if attempt < policy.max_attempts {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        if strategy.has_failover() {
            if let Some(fallback) = fallback {
                debug!(workflow_id, step_id, "attempts exhausted, trying failover");
                if let Ok(value) = fallback().await {
                    return Ok(value);
                }
            }
        }

        Err(RuntimeError::RecoveryExhausted {
            step: step_id.to_string(),
            attempts: policy.max_attempts,
        })
        .map_err(|e| {
            if let Some((message, _)) = last_error {
                RuntimeError::Internal(format!("{e}: last error was {message}"))
            } else {
                e
            }
        })
    }

    pub fn assignments_snapshot(&self) -> HashMap<(String, String), (String, String)> {
        self.assignments
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_succeeds() {
        let manager = RetryManager::new();
        let result: Result<u32> = manager
            .execute(
                "wf",
                "step",
                |_ctx| async { Ok::<_, (String, Option<String>)>(42) },
                None::<fn() -> std::future::Ready<std::result::Result<u32, (String, Option<String>)>>>,
            )
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_until_success_within_max_attempts() {
        let manager = RetryManager::new();
        let mut fast_policy = RetryPolicyConfig::default();
        fast_policy.base_delay_ms = 1;
        fast_policy.max_delay_ms = 2;
        fast_policy.max_attempts = 5;
        manager.register_policy(fast_policy.clone());
        manager.assign("wf", "flaky", fast_policy.name.clone(), "standard");

        let calls = AtomicU32::new(0);
        let result: Result<&str> = manager
            .execute(
                "wf",
                "flaky",
                |_ctx| {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(("not yet".to_string(), None))
                        } else {
                            Ok("done")
                        }
                    }
                },
                None::<fn() -> std::future::Ready<std::result::Result<&str, (String, Option<String>)>>>,
            )
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_attempts_without_failover_returns_recovery_exhausted() {
        let manager = RetryManager::new();
        let mut fast_policy = RetryPolicyConfig::default();
        fast_policy.name = "fast".into();
        fast_policy.base_delay_ms = 1;
        fast_policy.max_delay_ms = 1;
        fast_policy.max_attempts = 2;
        manager.register_policy(fast_policy.clone());
        manager.assign("wf", "always-fails", "fast", "standard");

        let result: Result<()> = manager
            .execute(
                "wf",
                "always-fails",
                |_ctx| async { Err::<(), _>(("boom".to_string(), None)) },
                None::<fn() -> std::future::Ready<std::result::Result<(), (String, Option<String>)>>>,
            )
            .await;
        assert!(matches!(result, Err(RuntimeError::Internal(_))));
    }

    #[tokio::test]
    async fn failover_strategy_falls_back_after_attempts_exhausted() {
        let manager = RetryManager::new();
        let mut fast_policy = RetryPolicyConfig::default();
        fast_policy.name = "fast".into();
        fast_policy.base_delay_ms = 1;
        fast_policy.max_delay_ms = 1;
        fast_policy.max_attempts = 1;
        manager.register_policy(fast_policy.clone());
        manager.register_strategy("failover", RetryStrategyKind::Failover);
        manager.assign("wf", "step", "fast", "failover");

        let result: Result<&str> = manager
            .execute(
                "wf",
                "step",
                |_ctx| async { Err::<&str, _>(("primary down".to_string(), None)) },
                Some(|| async { Ok::<_, (String, Option<String>)>("fallback result") }),
            )
            .await;
        assert_eq!(result.unwrap(), "fallback result");
    }
}
