// Recovery Manager: ordered recovery strategies over transactional step
// execution.
//
// Grounded in `original_source/core/recovery_system.py` in full.

//! # Recovery Manager
//!
//! When a step fails, something has to decide what happens next: retry it,
//! roll back its state mutations and give up, try an alternate
//! implementation, or skip it with a conservative default. This module
//! makes that decision using the ordered strategy list described in
//! SPEC_FULL.md §2.E, built on top of the [`engine::checkpoint`] and
//! [`engine::retry`] modules rather than duplicating their machinery.

pub mod manager;
pub mod transaction;

pub use manager::{RecoveryAction, RecoveryManager, RecoveryOutcome};
pub use transaction::TransactionManager;
