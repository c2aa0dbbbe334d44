// Circuit breaker: trips open after a run of consecutive failures,
// recovers through a half-open probe window.
//
// Grounded in `original_source/core/retry_system.py`'s circuit-breaker
// fields on RetryPolicy, and the reference crate's own name
// (`castingclouds-circuit-breaker`) as the idiom this pattern is grounded
// in.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::{Result, RuntimeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// A single named circuit breaker. `CircuitBreaker` is `Send + Sync` and
/// cheap to share behind an `Arc`; the Retry Engine keeps one per policy
/// that opts into circuit breaking.
pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    recovery: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, threshold: u32, recovery: Duration) -> Self {
        CircuitBreaker {
            name: name.into(),
            threshold,
            recovery,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Returns `Ok(())` if a call is currently allowed through (closed or
    /// half-open probing), `Err(CircuitOpen)` otherwise.
    pub fn check(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::Open {
            let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
            if elapsed >= self.recovery {
                inner.state = CircuitState::HalfOpen;
            } else {
                return Err(RuntimeError::CircuitOpen {
                    name: self.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::HalfOpen => {
                // A failed probe re-opens the circuit immediately.
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            _ => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.inner.lock().unwrap().state, CircuitState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_millis(50));
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.check().is_ok());
        breaker.record_failure();
        assert!(breaker.check().is_err());
    }

    #[test]
    fn success_resets_the_failure_count() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_millis(50));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.check().is_ok());
    }

    #[test]
    fn half_open_probe_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(10));
        breaker.record_failure();
        assert!(breaker.check().is_err());
        std::thread::sleep(Duration::from_millis(15));
        // check() transitions Open -> HalfOpen once the recovery window elapses.
        assert!(breaker.check().is_ok());
        breaker.record_failure();
        assert!(breaker.check().is_err());
    }
}
