// Checkpoint Manager: point-in-time snapshots of the state store, with
// in-memory retention plus disk persistence for crash recovery.
//
// Grounded in `original_source/core/recovery_system.py`'s CheckpointManager
// class, and in this crate's `engine::storage` teacher module's pattern of
// an async trait in front of a concrete backing store.

//! # Checkpoint Manager
//!
//! Checkpoints let the Recovery Manager undo a step's state mutations when
//! that step fails: capture the relevant variables before the step runs,
//! restore them if it doesn't succeed.
//!
//! ## Restore semantics (SPEC_FULL.md §2.B, resolving `spec.md` §9's Open
//! Question #1)
//!
//! A checkpointed variable absent from the live [`StateStore`] at restore
//! time is re-created with [`StateScope::Workflow`], not treated as an
//! error — this mirrors `CheckpointManager.restore_checkpoint` in the
//! Python reference.

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use crate::engine::state_store::StateStore;
use crate::models::{Checkpoint, CheckpointType, StateScope};
use crate::{Result, RuntimeError};

/// Manages checkpoint capture, retention, and restoration for one workflow
/// run's state store.
pub struct CheckpointManager {
    state_store: Arc<StateStore>,
    /// In-memory retention, keyed by checkpoint id, for fast rollback
    /// without a disk round-trip.
    checkpoints: DashMap<String, Checkpoint>,
    /// Most recent checkpoint id per `(workflow_id, step_id)`, so recovery
    /// code can roll back "to before this step" without tracking ids
    /// itself.
    latest_by_step: DashMap<(String, String), String>,
    checkpoint_dir: Option<PathBuf>,
}

impl CheckpointManager {
    pub fn new(state_store: Arc<StateStore>) -> Self {
        CheckpointManager {
            state_store,
            checkpoints: DashMap::new(),
            latest_by_step: DashMap::new(),
            checkpoint_dir: None,
        }
    }

    /// Enable disk persistence of every checkpoint under `dir`, one JSON
    /// file per checkpoint, named `<workflow_id>/<checkpoint_id>.json`.
    pub fn with_disk_persistence(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    /// Capture the workflow scope of the live state store as a new
    /// checkpoint.
    pub async fn capture(
        &self,
        workflow_id: impl Into<String>,
        step_id: Option<String>,
        checkpoint_type: CheckpointType,
    ) -> Result<Checkpoint> {
        let workflow_id = workflow_id.into();
        let variables = self.state_store.export_scope(StateScope::Workflow).await;
        let checkpoint = Checkpoint::new(workflow_id.clone(), step_id.clone(), checkpoint_type, variables);

        if let Some(step_id) = &step_id {
            self.latest_by_step
                .insert((workflow_id.clone(), step_id.clone()), checkpoint.id.clone());
        }

        if let Some(dir) = &self.checkpoint_dir {
            self.persist(dir, &checkpoint).await?;
        }

        debug!(checkpoint_id = %checkpoint.id, workflow_id = %checkpoint.workflow_id, "captured checkpoint");
        self.checkpoints.insert(checkpoint.id.clone(), checkpoint.clone());
        Ok(checkpoint)
    }

    /// Restore the state store to the values recorded in `checkpoint_id`.
    /// Any variable in the checkpoint missing from the live store is
    /// re-created with workflow scope; see the module doc comment above.
    pub async fn restore(&self, checkpoint_id: &str) -> Result<()> {
        let checkpoint = self.get(checkpoint_id).await?;
        for (name, value) in checkpoint.variables {
            self.state_store
                .set_or_create(&name, value, StateScope::Workflow)
                .await?;
        }
        info!(checkpoint_id, "restored checkpoint");
        Ok(())
    }

    /// Restore to the most recent checkpoint taken before `step_id` ran.
    pub async fn restore_before_step(&self, workflow_id: &str, step_id: &str) -> Result<()> {
        let key = (workflow_id.to_string(), step_id.to_string());
        let checkpoint_id = self
            .latest_by_step
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RuntimeError::CheckpointNotFound {
                id: format!("{workflow_id}/{step_id}"),
            })?;
        self.restore(&checkpoint_id).await
    }

    pub async fn get(&self, checkpoint_id: &str) -> Result<Checkpoint> {
        if let Some(entry) = self.checkpoints.get(checkpoint_id) {
            return Ok(entry.value().clone());
        }
        if let Some(dir) = &self.checkpoint_dir {
            return self.load(dir, checkpoint_id).await;
        }
        Err(RuntimeError::CheckpointNotFound {
            id: checkpoint_id.to_string(),
        })
    }

    async fn persist(&self, dir: &PathBuf, checkpoint: &Checkpoint) -> Result<()> {
        let workflow_dir = dir.join(&checkpoint.workflow_id);
        fs::create_dir_all(&workflow_dir).await?;
        let path = workflow_dir.join(format!("{}.json", checkpoint.id));
        let json = serde_json::to_vec_pretty(checkpoint)?;
        fs::write(path, json).await?;
        Ok(())
    }

    async fn load(&self, dir: &PathBuf, checkpoint_id: &str) -> Result<Checkpoint> {
        // The checkpoint id alone doesn't tell us the workflow subdirectory,
        // so scan one level deep. Retention is bounded by how many
        // workflows have ever checkpointed on this host.
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| RuntimeError::Persistence(anyhow::anyhow!(e)))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RuntimeError::Persistence(anyhow::anyhow!(e)))?
        {
            let candidate = entry.path().join(format!("{checkpoint_id}.json"));
            if candidate.exists() {
                let bytes = fs::read(candidate).await?;
                let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
                return Ok(checkpoint);
            }
        }
        Err(RuntimeError::CheckpointNotFound {
            id: checkpoint_id.to_string(),
        })
    }
}
