// Progress Tracker: hierarchical weighted progress with ETA estimation,
// disk checkpointing, and session broadcast.
//
// Grounded in `original_source/core/progress_tracker.py` in full.

//! # Progress Tracker
//!
//! Tracks nested workflow/step/subtask/operation progress as a tree,
//! rolling each change up to its ancestors by weight, estimating time
//! remaining from a bounded history of progress-rate samples, and
//! broadcasting every status change to subscribed sessions. See
//! SPEC_FULL.md §2.F for the full module contract.

pub mod estimator;
pub mod item;
pub mod state;
pub mod tracker;

pub use item::ProgressItem;
pub use state::ProgressState;
pub use tracker::{ProgressBroadcast, ProgressTracker};
