// TransactionManager: checkpoint-on-entry, restore-on-exception step
// execution wrapper.
//
// Grounded in `original_source/core/recovery_system.py`'s TransactionManager
// class.

use std::sync::Arc;

use crate::engine::checkpoint::CheckpointManager;
use crate::models::CheckpointType;
use crate::Result;

/// Wraps a step's execution in checkpoint-before / restore-on-failure
/// semantics, independent of any retry or recovery-strategy decision made
/// about *whether* to retry — this only ever concerns itself with
/// "did the step's own state mutations need undoing".
pub struct TransactionManager {
    checkpoints: Arc<CheckpointManager>,
}

impl TransactionManager {
    pub fn new(checkpoints: Arc<CheckpointManager>) -> Self {
        TransactionManager { checkpoints }
    }

    /// Run `step` inside a transaction: capture a checkpoint first, run
    /// `step`, and if it returns `Err`, restore the checkpoint before
    /// propagating the error.
    pub async fn run<F, Fut, T>(&self, workflow_id: &str, step_id: &str, step: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let checkpoint = self
            .checkpoints
            .capture(workflow_id, Some(step_id.to_string()), CheckpointType::PreStep)
            .await?;

        match step().await {
            Ok(value) => Ok(value),
            Err(error) => {
                self.checkpoints.restore(&checkpoint.id).await?;
                Err(error)
            }
        }
    }
}
