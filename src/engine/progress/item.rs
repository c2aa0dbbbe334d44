// ProgressItem: one node in the progress arena, with its own lifecycle
// transitions.
//
// Grounded in `original_source/core/progress_tracker.py`'s ProgressItem
// class.

use chrono::{DateTime, Utc};

use crate::models::{ProgressItemState, ProgressItemType, ProgressStatus};

/// One unit of trackable work. Items form a tree via `parent_id`, but the
/// tree itself lives in [`super::state::ProgressState`]'s arena rather than
/// as owned child pointers here — Rust has no natural analogue for the
/// Python reference's parent/child object references without either
/// reference counting every node or indexing into a shared table, and the
/// table is simpler to reason about under a lock. See SPEC_FULL.md §2.F.
#[derive(Debug, Clone)]
pub struct ProgressItem {
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
    pub message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Sum of all `running` intervals so far, for items that have been
    /// paused and resumed one or more times.
    active_duration_secs: f64,
    /// When the item most recently transitioned into `Running`, used to
    /// compute the next slice of active duration on pause/complete.
    last_resumed_at: Option<DateTime<Utc>>,
}

impl ProgressItem {
    pub fn new(
        id: impl Into<String>,
        parent_id: Option<String>,
        name: impl Into<String>,
        item_type: ProgressItemType,
        weight: f64,
    ) -> Self {
        ProgressItem {
            id: id.into(),
            parent_id,
            name: name.into(),
            item_type,
            status: ProgressStatus::Pending,
            percent_complete: 0.0,
            weight,
            total_work: None,
            completed_work: 0.0,
            estimated_duration_secs: None,
            message: None,
            started_at: None,
            completed_at: None,
            active_duration_secs: 0.0,
            last_resumed_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = ProgressStatus::Running;
        let now = Utc::now();
        self.started_at.get_or_insert(now);
        self.last_resumed_at = Some(now);
    }

    pub fn update(&mut self, percent_complete: f64, message: Option<String>) {
        self.percent_complete = percent_complete.clamp(0.0, 100.0);
        if message.is_some() {
            self.message = message;
        }
    }

    pub fn increment(&mut self, delta_work: f64) {
        self.completed_work += delta_work;
        if let Some(total) = self.total_work {
            if total > 0.0 {
                self.percent_complete = (self.completed_work / total * 100.0).clamp(0.0, 100.0);
            }
        }
    }

    pub fn complete(&mut self) {
        self.settle_active_duration();
        self.status = ProgressStatus::Completed;
        self.percent_complete = 100.0;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.settle_active_duration();
        self.status = ProgressStatus::Failed;
        self.message = Some(message.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn pause(&mut self) {
        self.settle_active_duration();
        self.status = ProgressStatus::Paused;
    }

    pub fn resume(&mut self) {
        self.status = ProgressStatus::Running;
        self.last_resumed_at = Some(Utc::now());
    }

    pub fn skip(&mut self, message: impl Into<String>) {
        self.settle_active_duration();
        self.status = ProgressStatus::Skipped;
        self.message = Some(message.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ProgressStatus::Completed | ProgressStatus::Failed | ProgressStatus::Skipped
        )
    }

    /// Cumulative wall-clock time this item has spent `Running`, across
    /// any pause/resume cycles.
    pub fn active_duration(&self) -> f64 {
        let mut total = self.active_duration_secs;
        if self.status == ProgressStatus::Running {
            if let Some(resumed_at) = self.last_resumed_at {
                total += (Utc::now() - resumed_at).num_milliseconds() as f64 / 1000.0;
            }
        }
        total
    }

    fn settle_active_duration(&mut self) {
        if let Some(resumed_at) = self.last_resumed_at.take() {
            self.active_duration_secs += (Utc::now() - resumed_at).num_milliseconds() as f64 / 1000.0;
        }
    }

    pub fn set_estimated_duration(&mut self, secs: f64) {
        self.estimated_duration_secs = Some(secs);
    }

    pub fn to_state(&self) -> ProgressItemState {
        ProgressItemState {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            name: self.name.clone(),
            item_type: self.item_type,
            status: self.status,
            percent_complete: self.percent_complete,
            weight: self.weight,
            total_work: self.total_work,
            completed_work: self.completed_work,
            estimated_duration_secs: self.estimated_duration_secs,
            active_duration_secs: self.active_duration(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            message: self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_computes_percent_from_total_work() {
        let mut item = ProgressItem::new("a", None, "A", ProgressItemType::Step, 1.0);
        item.total_work = Some(4.0);
        item.start();
        item.increment(1.0);
        assert_eq!(item.percent_complete, 25.0);
        item.increment(3.0);
        assert_eq!(item.percent_complete, 100.0);
    }

    #[test]
    fn complete_forces_percent_to_100() {
        let mut item = ProgressItem::new("a", None, "A", ProgressItemType::Step, 1.0);
        item.start();
        item.update(40.0, None);
        item.complete();
        assert_eq!(item.percent_complete, 100.0);
        assert!(item.is_terminal());
    }
}
