// Retry engine data model: backoff strategies, policy configuration, and
// the per-(workflow, step) retry context.
//
// Grounded in `original_source/core/retry_system.py`'s BackoffStrategy,
// RetryPolicyConfig, and StepRetryContext classes. Per SPEC_FULL.md §2.D,
// this is the *only* RetryPolicy type in the crate; the Recovery Manager's
// `Retry` action (see `engine::recovery`) delegates to a policy of this
// shape rather than carrying a second, simpler one.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The shape of the delay curve applied between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Constant,
    Linear,
    Exponential,
    Fibonacci,
    Random,
    DecorrelatedJitter,
}

/// Configuration for one named retry policy.
///
/// `base_delay_ms` / `max_delay_ms` are expressed in milliseconds rather
/// than `Duration` so the type remains trivially (de)serializable and
/// comparable the way the Python reference's plain-number fields are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    pub name: String,
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Multiplier applied per attempt for `Exponential`; ignored by other
    /// strategies.
    pub multiplier: f64,
    /// Circuit breaker failure threshold before the policy's circuit opens.
    /// `None` disables the circuit breaker for this policy.
    pub circuit_breaker_threshold: Option<u32>,
    /// How long an open circuit stays open before moving to half-open.
    pub circuit_breaker_recovery_ms: Option<u64>,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        RetryPolicyConfig {
            name: "default".to_string(),
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            multiplier: 2.0,
            circuit_breaker_threshold: None,
            circuit_breaker_recovery_ms: None,
        }
    }
}

impl RetryPolicyConfig {
    /// The policy documented verbatim in `spec.md` §8's exponential-backoff
    /// test scenario: 100, 200, 400, 800, then capped at 1000ms.
    pub fn documented_exponential_example() -> Self {
        RetryPolicyConfig {
            name: "documented-exponential".to_string(),
            max_attempts: 5,
            backoff: BackoffStrategy::Exponential,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            multiplier: 2.0,
            circuit_breaker_threshold: None,
            circuit_breaker_recovery_ms: None,
        }
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Per-`(workflow, step)` retry bookkeeping: how many attempts have been
/// made, and when the next one is eligible to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRetryContext {
    pub workflow_id: String,
    pub step_id: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl StepRetryContext {
    pub fn new(workflow_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        StepRetryContext {
            workflow_id: workflow_id.into(),
            step_id: step_id.into(),
            attempts: 0,
            last_error: None,
        }
    }
}
