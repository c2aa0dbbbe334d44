// Retry Engine: backoff strategies, circuit breaking, and named retry
// policy/strategy management.
//
// Grounded in `original_source/core/retry_system.py` in full.

//! # Retry Engine
//!
//! Everything about *how* and *whether* a failed step gets retried lives
//! here: the six backoff curves ([`policy::delay_for`]), circuit breaking
//! ([`circuit_breaker::CircuitBreaker`]), the three retry strategies
//! ([`strategy::RetryStrategyKind`]), and the coordinator that ties a
//! `(workflow, step)` pair to a named policy/strategy pair and runs the
//! attempt loop ([`manager::RetryManager`]).
//!
//! The Recovery Manager's `Retry` action (`engine::recovery`) delegates to
//! this module's [`RetryManager`] rather than carrying its own policy type;
//! see SPEC_FULL.md §2.D for why there is exactly one `RetryPolicy` shape
//! in this crate where the Python reference had two.

pub mod circuit_breaker;
pub mod manager;
pub mod monitor;
pub mod policy;
pub mod strategy;

pub use circuit_breaker::CircuitBreaker;
pub use manager::{RetryAttemptContext, RetryManager};
pub use monitor::{RetryMonitor, RetryMonitorRecord, RetryReporter, RetryStats};
pub use strategy::RetryStrategyKind;

/// `RetryPolicy` is the public name for the policy configuration type this
/// module (and the Recovery Manager) operates on.
pub use crate::models::RetryPolicyConfig as RetryPolicy;
