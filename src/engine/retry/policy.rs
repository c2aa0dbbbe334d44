// Retry policy delay computation: the six backoff strategies.
//
// Grounded in `original_source/core/retry_system.py`'s RetryPolicy class,
// specifically its per-strategy delay formulas.

use rand::Rng;

use crate::models::{BackoffStrategy, RetryPolicyConfig};

/// Compute the delay before retry attempt number `attempt` (1-based: the
/// delay waited *before* the first retry, i.e. after the first failure, is
/// `delay_for(policy, 1)`).
///
/// The `documented_exponential_example` policy in `spec.md` §8 produces the
/// exact sequence 100, 200, 400, 800, then capped at 1000ms for attempts
/// 1..=5 — this function is what that scenario exercises.
pub fn delay_for(policy: &RetryPolicyConfig, attempt: u32) -> u64 {
    let raw = match policy.backoff {
        BackoffStrategy::Constant => policy.base_delay_ms,
        BackoffStrategy::Linear => policy.base_delay_ms * attempt as u64,
        BackoffStrategy::Exponential => {
            let scaled = policy.base_delay_ms as f64 * policy.multiplier.powi(attempt as i32 - 1);
            scaled.round() as u64
        }
        BackoffStrategy::Fibonacci => policy.base_delay_ms * fibonacci(attempt),
        BackoffStrategy::Random => {
            let mut rng = rand::thread_rng();
            rng.gen_range(policy.base_delay_ms..=policy.max_delay_ms.max(policy.base_delay_ms))
        }
        BackoffStrategy::DecorrelatedJitter => {
            // AWS's "decorrelated jitter": sleep = min(cap, random_between(base, prev * 3)).
            // Since this function is stateless per call, `prev` is taken as
            // the previous attempt's exponential delay, matching the
            // reference implementation's closed-form approximation.
            let prev = if attempt <= 1 {
                policy.base_delay_ms
            } else {
                delay_for(policy, attempt - 1)
            };
            let mut rng = rand::thread_rng();
            let upper = (prev.saturating_mul(3)).max(policy.base_delay_ms);
            rng.gen_range(policy.base_delay_ms..=upper)
        }
    };
    raw.min(policy.max_delay_ms)
}

fn fibonacci(n: u32) -> u64 {
    if n == 0 {
        return 0;
    }
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 1..n {
        let next = a + b;
        a = b;
        b = next;
    }
    b
}
