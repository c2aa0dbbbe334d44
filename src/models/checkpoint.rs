// Checkpoint data model.
//
// Grounded in `original_source/core/recovery_system.py`'s `Checkpoint` and
// `CheckpointType` classes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::value::Value;

/// Why a checkpoint was taken, kept for diagnostics and for the Recovery
/// Manager's choice of which checkpoint to roll back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    /// Taken automatically before a step/node starts executing.
    PreStep,
    /// Taken explicitly by caller code at a meaningful boundary.
    Manual,
    /// Taken just before a recovery rollback is attempted.
    PreRecovery,
}

/// A point-in-time snapshot of a variable scope's values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub workflow_id: String,
    pub step_id: Option<String>,
    pub checkpoint_type: CheckpointType,
    pub variables: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        workflow_id: impl Into<String>,
        step_id: Option<String>,
        checkpoint_type: CheckpointType,
        variables: HashMap<String, Value>,
    ) -> Self {
        Checkpoint {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            step_id,
            checkpoint_type,
            variables,
            created_at: Utc::now(),
        }
    }
}
