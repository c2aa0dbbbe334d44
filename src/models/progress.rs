// Progress tracker data model: item status/type enums and the serialized
// snapshot form of a progress item.
//
// Grounded in `original_source/core/progress_tracker.py`'s ProgressStatus,
// ProgressItemType, and ProgressEvent enums, and `ProgressItem.to_dict`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a progress item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Skipped,
}

/// What kind of unit of work a progress item represents. Only
/// `Workflow`/`Step` items ever get rolled up into a parent's percentage;
/// `Subtask`/`Operation` items are leaves used for finer-grained streaming
/// progress updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressItemType {
    Workflow,
    Step,
    Subtask,
    Operation,
}

/// Broadcastable event kinds emitted as an item's status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEvent {
    Started,
    Updated,
    Completed,
    Failed,
    Paused,
    Resumed,
    Skipped,
}

/// A serializable snapshot of a progress item, matching the JSON shape
/// `spec.md` §6 documents for progress checkpoint files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressItemState {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub item_type: ProgressItemType,
    pub status: ProgressStatus,
    pub percent_complete: f64,
    pub weight: f64,
    pub total_work: Option<f64>,
    pub completed_work: f64,
    pub estimated_duration_secs: Option<f64>,
    pub active_duration_secs: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}
