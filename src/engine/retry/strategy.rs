// Retry strategies: what happens across the attempts a policy allows,
// beyond just "wait the backoff delay and try again".
//
// Grounded in `original_source/core/retry_system.py`'s RetryStrategy base
// class and its Standard/GradualDegradation/Failover subclasses.

/// How a [`super::RetryManager`] run behaves across attempts.
///
/// ## Rust Learning Notes:
///
/// The Python reference models each strategy as a subclass overriding a
/// single `execute` method. Rust doesn't need inheritance for this: a
/// closed, three-variant enum is both exhaustive (the compiler checks every
/// match covers all three) and avoids a trait object for something that
/// never grows new variants at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategyKind {
    /// Retry the same operation with the policy's backoff between
    /// attempts; no change in behavior across attempts.
    Standard,
    /// After `degrade_after` attempts, subsequent retries ask the caller's
    /// operation to run in a reduced-fidelity mode (e.g. a smaller request,
    /// a cheaper model) via the `degraded: bool` flag passed to the
    /// operation closure.
    GradualDegradation { degrade_after: u32 },
    /// After the policy's attempts are exhausted against the primary
    /// operation, run a single attempt against a caller-supplied fallback
    /// operation instead of failing outright.
    Failover,
}

impl RetryStrategyKind {
    pub fn should_degrade(&self, attempt: u32) -> bool {
        matches!(self, RetryStrategyKind::GradualDegradation { degrade_after } if attempt > *degrade_after)
    }

    pub fn has_failover(&self) -> bool {
        matches!(self, RetryStrategyKind::Failover)
    }
}
