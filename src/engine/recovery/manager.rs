// RecoveryManager: ordered recovery strategies (Retry -> Rollback ->
// AlternatePath, first applicable wins) plus the recovery_context/
// with_recovery wrappers around transactional step execution.
//
// Grounded in `original_source/core/recovery_system.py`'s RecoveryAction,
// RecoveryContext, RecoveryCallback, and RecoveryManager classes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use crate::engine::error_category::{ErrorCategorizer, ErrorCategory};
use crate::engine::retry::manager::RetryAttemptContext;
use crate::engine::retry::RetryManager;
use crate::{Result, RuntimeError};

use super::transaction::TransactionManager;

/// What the Recovery Manager decided to do about a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry the step via the Retry Engine's policy for this step.
    Retry,
    /// Roll back to the last checkpoint and surface the error (the
    /// `TransactionManager` already performed the rollback by the time the
    /// caller sees this outcome).
    Rollback,
    /// Run a caller-supplied alternate implementation instead of the
    /// primary step.
    AlternatePath,
    /// Conservatively substitute a caller-supplied default output and
    /// continue.
    Skip,
    /// No recovery is applicable; propagate the error.
    Abort,
}

/// Maps an [`ErrorCategory`] to its default recovery disposition, per
/// `spec.md` §7's error-handling design: TRANSIENT/RESOURCE/DEPENDENCY/
/// TIMEOUT default to retry; LOGICAL/STATE_INVALID default to rollback (if
/// a checkpoint exists — `with_recovery`'s transaction already attempted
/// that rollback by the time this disposition is consulted); SECURITY/
/// PERMISSION are fatal and never retried; UNKNOWN is retried once then
/// aborted (see the `Unknown`-specific attempt cap in `with_recovery`).
/// `AlternatePath` is never a category default — per §4.E it applies only
/// when the caller has registered an alternate for the step id, so it is
/// reached only when an operator opts a category into it explicitly via
/// `RecoveryManager::override_action` (the same mechanism `Skip` uses).
fn default_action_for(category: ErrorCategory) -> RecoveryAction {
    match category {
        ErrorCategory::Transient
        | ErrorCategory::Resource
        | ErrorCategory::Timeout
        | ErrorCategory::Dependency
        | ErrorCategory::Unknown => RecoveryAction::Retry,
        ErrorCategory::Logical | ErrorCategory::StateInvalid => RecoveryAction::Rollback,
        ErrorCategory::Security | ErrorCategory::Permission => RecoveryAction::Abort,
    }
}

/// The ordered list of strategies this manager will consider, first
/// applicable one wins, per SPEC_FULL.md §2.E. `Skip`/`Abort` are terminal
/// dispositions rather than strategies to attempt in order, so they are not
/// part of this list.
const STRATEGY_ORDER: &[RecoveryAction] = &[
    RecoveryAction::Retry,
    RecoveryAction::Rollback,
    RecoveryAction::AlternatePath,
];

/// Outcome of a `with_recovery`-wrapped step.
pub enum RecoveryOutcome<T> {
    Succeeded(T),
    /// The step failed and a `Skip` action substituted `default`.
    Skipped(T),
    /// The step failed and no strategy resolved it.
    Failed(RuntimeError),
}

/// Coordinates recovery for failed steps: categorize, pick the first
/// applicable strategy from [`STRATEGY_ORDER`] (falling back to the
/// category's default if no override is configured), and apply it.
///
/// The local retry limit here is distinct from whatever `max_attempts` a
/// Retry Engine policy carries (SPEC_FULL.md §2.D): this is a ceiling on
/// how many times *recovery itself* will re-attempt a step before giving up
/// and moving to the next strategy in `STRATEGY_ORDER`.
pub struct RecoveryManager {
    categorizer: ErrorCategorizer,
    retry_manager: Arc<RetryManager>,
    transactions: TransactionManager,
    overrides: HashMap<ErrorCategory, RecoveryAction>,
    local_retry_limit: u32,
}

impl RecoveryManager {
    pub fn new(retry_manager: Arc<RetryManager>, transactions: TransactionManager) -> Self {
        RecoveryManager {
            categorizer: ErrorCategorizer::new(),
            retry_manager,
            transactions,
            overrides: HashMap::new(),
            local_retry_limit: 2,
        }
    }

    pub fn with_local_retry_limit(mut self, limit: u32) -> Self {
        self.local_retry_limit = limit;
        self
    }

    pub fn override_action(&mut self, category: ErrorCategory, action: RecoveryAction) {
        self.overrides.insert(category, action);
    }

    fn action_for(&self, category: ErrorCategory) -> RecoveryAction {
        self.overrides
            .get(&category)
            .copied()
            .unwrap_or_else(|| default_action_for(category))
    }

    /// Run `step` transactionally, recovering from a failure per the
    /// ordered strategy list. `alternate`, if provided, backs the
    /// `AlternatePath` strategy. `skip_default`, if provided, backs a `Skip`
    /// disposition an override maps a category to.
    pub async fn with_recovery<F, Fut, Alt, AltFut, T>(
        &self,
        workflow_id: &str,
        step_id: &str,
        mut step: F,
        alternate: Option<Alt>,
        skip_default: Option<T>,
    ) -> RecoveryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        Alt: FnOnce() -> AltFut,
        AltFut: Future<Output = Result<T>>,
        T: Clone,
    {
        let first_attempt = self
            .transactions
            .run(workflow_id, step_id, || step())
            .await;

        let error = match first_attempt {
            Ok(value) => return RecoveryOutcome::Succeeded(value),
            Err(error) => error,
        };

        let category = self.categorizer.categorize(&error.to_string(), None);
        let preferred = self.action_for(category);
        warn!(workflow_id, step_id, ?category, ?preferred, "step failed, entering recovery");

        for &candidate in STRATEGY_ORDER {
            if candidate != preferred {
                continue;
            }
            match candidate {
                RecoveryAction::Retry => {
                    // `spec.md` §7: UNKNOWN is "retried once then aborted"
                    // regardless of the configured local retry limit; every
                    // other retry-disposed category uses that limit.
                    let limit = if category == ErrorCategory::Unknown {
                        1
                    } else {
                        self.local_retry_limit
                    };
                    for attempt in 1..=limit {
                        let retry_result = self
                            .retry_manager
                            .execute(
                                workflow_id,
                                step_id,
                                |_ctx: RetryAttemptContext| {
                                    let fut = step();
                                    async move { fut.await.map_err(|e| (e.to_string(), None)) }
                                },
                                None::<fn() -> std::future::Ready<std::result::Result<T, (String, Option<String>)>>>,
                            )
                            .await;
                        match retry_result {
                            Ok(value) => return RecoveryOutcome::Succeeded(value),
                            Err(_) if attempt < limit => continue,
                            Err(e) => return RecoveryOutcome::Failed(e),
                        }
                    }
                }
                RecoveryAction::Rollback => {
                    // The TransactionManager already rolled state back to
                    // before the failed attempt; recovery's job here is
                    // just to decide that no further action is warranted.
                    return RecoveryOutcome::Failed(error);
                }
                RecoveryAction::AlternatePath => {
                    if let Some(alternate) = alternate {
                        return match alternate().await {
                            Ok(value) => RecoveryOutcome::Succeeded(value),
                            Err(e) => RecoveryOutcome::Failed(e),
                        };
                    }
                    return RecoveryOutcome::Failed(error);
                }
                _ => unreachable!("Skip/Abort are not members of STRATEGY_ORDER"),
            }
        }

        match preferred {
            RecoveryAction::Skip => {
                if let Some(default_value) = skip_default {
                    info!(workflow_id, step_id, "skipping step with caller-supplied default");
                    return RecoveryOutcome::Skipped(default_value);
                }
                RecoveryOutcome::Failed(error)
            }
            _ => RecoveryOutcome::Failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::checkpoint::CheckpointManager;
    use crate::engine::state_store::StateStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn make_manager() -> RecoveryManager {
        let store = StateStore::new();
        let checkpoints = Arc::new(CheckpointManager::new(store));
        let transactions = TransactionManager::new(checkpoints);
        let retry_manager = Arc::new(RetryManager::new());
        RecoveryManager::new(retry_manager, transactions)
    }

    #[tokio::test]
    async fn successful_step_needs_no_recovery() {
        let manager = make_manager();
        let outcome = manager
            .with_recovery(
                "wf",
                "step",
                || async { Ok::<_, RuntimeError>(1) },
                None::<fn() -> std::future::Ready<Result<i32>>>,
                None,
            )
            .await;
        assert!(matches!(outcome, RecoveryOutcome::Succeeded(1)));
    }

    #[tokio::test]
    async fn transient_category_retries_until_success() {
        let manager = make_manager();
        let calls = AtomicU32::new(0);
        let outcome = manager
            .with_recovery(
                "wf",
                "step",
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(RuntimeError::Internal("temporarily unavailable".into()))
                        } else {
                            Ok(7)
                        }
                    }
                },
                None::<fn() -> std::future::Ready<Result<i32>>>,
                None,
            )
            .await;
        assert!(matches!(outcome, RecoveryOutcome::Succeeded(7)));
    }

    #[tokio::test]
    async fn dependency_category_retries_by_default() {
        // spec.md §7: DEPENDENCY is among the categories that "default to
        // retry", not alternate-path.
        let manager = make_manager();
        let calls = AtomicU32::new(0);
        let outcome = manager
            .with_recovery(
                "wf",
                "step",
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(RuntimeError::Internal("connection refused".into()))
                        } else {
                            Ok(99)
                        }
                    }
                },
                None::<fn() -> std::future::Ready<Result<i32>>>,
                None,
            )
            .await;
        assert!(matches!(outcome, RecoveryOutcome::Succeeded(99)));
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn alternate_path_runs_once_a_category_is_overridden_to_it() {
        // AlternatePath is never a category default (per §4.E it applies
        // only when a step-specific alternate is registered); an operator
        // opts a category into it explicitly via `override_action`, the
        // same mechanism used to opt a category into `Skip`.
        let mut manager = make_manager();
        manager.override_action(ErrorCategory::Dependency, RecoveryAction::AlternatePath);
        let outcome = manager
            .with_recovery(
                "wf",
                "step",
                || async { Err::<i32, _>(RuntimeError::Internal("connection refused".into())) },
                Some(|| async { Ok::<i32, RuntimeError>(42) }),
                None,
            )
            .await;
        assert!(matches!(outcome, RecoveryOutcome::Succeeded(42)));
    }

    #[tokio::test]
    async fn logical_category_rolls_back_without_retry() {
        // spec.md §7/§8: LOGICAL defaults to rollback (the transaction has
        // already restored the pre-step checkpoint by the time this
        // disposition is consulted), not abort, and is never retried.
        let manager = make_manager();
        let calls = AtomicU32::new(0);
        let outcome = manager
            .with_recovery(
                "wf",
                "step",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<i32, _>(RuntimeError::Internal("assertion failed".into())) }
                },
                None::<fn() -> std::future::Ready<Result<i32>>>,
                None,
            )
            .await;
        assert!(matches!(outcome, RecoveryOutcome::Failed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_category_is_retried_once_then_aborted() {
        // spec.md §7: "UNKNOWN → retried once then aborted
        // (policy-configurable)" — regardless of the manager's configured
        // local retry limit.
        let manager = make_manager().with_local_retry_limit(5);
        let calls = AtomicU32::new(0);
        let outcome = manager
            .with_recovery(
                "wf",
                "step",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<i32, _>(RuntimeError::Internal("something bespoke went wrong".into())) }
                },
                None::<fn() -> std::future::Ready<Result<i32>>>,
                None,
            )
            .await;
        assert!(matches!(outcome, RecoveryOutcome::Failed(_)));
        // One call inside the transaction, one retry attempt, then abort.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
