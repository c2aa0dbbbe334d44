// ProgressTracker: the public API over the progress item arena, ETA
// estimator, disk checkpointing, and session broadcast.
//
// Grounded in `original_source/core/progress_tracker.py`'s ProgressTracker
// class, its module-level `progress_tracker`/`init_progress_tracker`
// globals, and its `track_progress` context manager.

use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{ProgressEvent, ProgressItemState, ProgressItemType, ProgressStatus};
use crate::{Result, RuntimeError};

use super::estimator::ProgressEstimator;
use super::item::ProgressItem;
use super::state::ProgressState;

/// A broadcastable message describing one item's status change. `recipients`
/// lists the session ids registered (via [`ProgressTracker::register_session`])
/// against the item's workflow — matching `progress_tracker.py`'s
/// `_broadcast_loop`, which looks up `sessions_to_notify` for the changed
/// workflow before dispatching. A caller driving a websocket/SSE layer
/// filters or fans out to `recipients`; this crate's single `broadcast::Sender`
/// carries every event to every subscriber and leaves per-session delivery to
/// the caller, since it has no socket registry of its own (that lives in
/// `engine::streaming`). Matches the progress broadcast message shape
/// `spec.md` §6 documents.
#[derive(Debug, Clone)]
pub struct ProgressBroadcast {
    pub workflow_id: String,
    pub item_id: String,
    pub event: ProgressEvent,
    pub state: ProgressItemState,
    pub recipients: Vec<String>,
}

/// Tracks hierarchical progress for one or more workflow runs: item
/// lifecycle, weighted rollup, ETA estimation, periodic disk checkpoints,
/// and a broadcast feed sessions can subscribe to.
///
/// ## Rust Learning Notes: resolving the `state_manager or state_manager` bug
///
/// `ProgressTracker::new` below takes a plain `Option<Arc<StateStore>>` and
/// really does fall back to `Arc::new(StateStore::default())` when `None`
/// is passed — the Python reference's `self.state_manager = state_manager
/// or state_manager` shadows its own parameter and never actually falls
/// back to anything (SPEC_FULL.md §2.F). This constructor's fallback is
/// real.
pub struct ProgressTracker {
    state: ProgressState,
    estimator: Mutex<ProgressEstimator>,
    state_store: Arc<crate::engine::state_store::StateStore>,
    workflow_roots: RwLock<HashMap<String, String>>,
    sessions: RwLock<HashMap<String, Vec<String>>>,
    broadcast_tx: broadcast::Sender<ProgressBroadcast>,
    next_id: AtomicU64,
    checkpoint_dir: Option<PathBuf>,
    cancellation: CancellationToken,
}

const BROADCAST_CHANNEL_CAPACITY: usize = 512;

impl ProgressTracker {
    pub fn new(state_store: Option<Arc<crate::engine::state_store::StateStore>>) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        Arc::new(ProgressTracker {
            state: ProgressState::new(),
            estimator: Mutex::new(ProgressEstimator::new()),
            state_store: state_store.unwrap_or_else(|| crate::engine::state_store::StateStore::new()),
            workflow_roots: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            broadcast_tx: tx,
            next_id: AtomicU64::new(1),
            checkpoint_dir: None,
            cancellation: CancellationToken::new(),
        })
    }

    pub fn new_with_checkpoint_dir(
        state_store: Option<Arc<crate::engine::state_store::StateStore>>,
        dir: impl Into<PathBuf>,
    ) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        Arc::new(ProgressTracker {
            state: ProgressState::new(),
            estimator: Mutex::new(ProgressEstimator::new()),
            state_store: state_store.unwrap_or_else(|| crate::engine::state_store::StateStore::new()),
            workflow_roots: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            broadcast_tx: tx,
            next_id: AtomicU64::new(1),
            checkpoint_dir: Some(dir.into()),
            cancellation: CancellationToken::new(),
        })
    }

    fn generate_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-{n}-{}", Uuid::new_v4())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressBroadcast> {
        self.broadcast_tx.subscribe()
    }

    pub async fn register_session(&self, session_id: impl Into<String>, workflow_id: impl Into<String>) {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.into())
            .or_default()
            .push(workflow_id.into());
    }

    pub async fn unregister_session(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    pub async fn create_workflow(&self, name: impl Into<String>, weight: f64) -> String {
        let id = self.generate_id("wf");
        self.state
            .add_item(ProgressItem::new(id.clone(), None, name, ProgressItemType::Workflow, weight))
            .await;
        self.workflow_roots.write().await.insert(id.clone(), id.clone());
        id
    }

    pub async fn create_step(&self, workflow_id: &str, parent_id: &str, name: impl Into<String>, weight: f64) -> Result<String> {
        let id = self.generate_id("step");
        self.state
            .add_item(ProgressItem::new(
                id.clone(),
                Some(parent_id.to_string()),
                name,
                ProgressItemType::Step,
                weight,
            ))
            .await;
        self.workflow_roots
            .write()
            .await
            .insert(id.clone(), workflow_id.to_string());
        Ok(id)
    }

    pub async fn create_subtask(&self, workflow_id: &str, parent_id: &str, name: impl Into<String>, weight: f64) -> Result<String> {
        let id = self.generate_id("subtask");
        self.state
            .add_item(ProgressItem::new(
                id.clone(),
                Some(parent_id.to_string()),
                name,
                ProgressItemType::Subtask,
                weight,
            ))
            .await;
        self.workflow_roots
            .write()
            .await
            .insert(id.clone(), workflow_id.to_string());
        Ok(id)
    }

    pub async fn create_operation(&self, workflow_id: &str, parent_id: &str, name: impl Into<String>, weight: f64) -> Result<String> {
        let id = self.generate_id("op");
        self.state
            .add_item(ProgressItem::new(
                id.clone(),
                Some(parent_id.to_string()),
                name,
                ProgressItemType::Operation,
                weight,
            ))
            .await;
        self.workflow_roots
            .write()
            .await
            .insert(id.clone(), workflow_id.to_string());
        Ok(id)
    }

    pub async fn start_item(&self, item_id: &str) -> Result<()> {
        self.estimator.lock().await.start_estimation(item_id);
        let state = self.state.update_item(item_id, |item| item.start()).await?;
        self.broadcast(item_id, ProgressEvent::Started, state).await;
        Ok(())
    }

    pub async fn update_progress(&self, item_id: &str, percent_complete: f64, message: Option<String>) -> Result<()> {
        let state = self
            .state
            .update_item(item_id, |item| item.update(percent_complete, message))
            .await?;
        self.estimator.lock().await.update_progress(item_id, percent_complete);
        self.broadcast(item_id, ProgressEvent::Updated, state).await;
        Ok(())
    }

    pub async fn increment_progress(&self, item_id: &str, delta_work: f64) -> Result<()> {
        let state = self.state.update_item(item_id, |item| item.increment(delta_work)).await?;
        self.estimator
            .lock()
            .await
            .update_progress(item_id, state.percent_complete);
        self.broadcast(item_id, ProgressEvent::Updated, state).await;
        Ok(())
    }

    pub async fn complete_item(&self, item_id: &str, cascade: bool) -> Result<()> {
        let state = self.state.update_item(item_id, |item| item.complete()).await?;
        if let Some(total_work) = state.total_work {
            self.estimator
                .lock()
                .await
                .complete_estimation(item_id, total_work, state.active_duration_secs);
        }
        // `cascade` only ever applies to the broader `mark_item_status`
        // cascade path (SPEC_FULL.md §9 Open Question #2); completion
        // propagation for one item never implicitly completes its children.
        if cascade {
            self.state
                .mark_item_status(item_id, ProgressStatus::Completed, true)
                .await?;
        }
        self.broadcast(item_id, ProgressEvent::Completed, state).await;
        Ok(())
    }

    pub async fn fail_item(&self, item_id: &str, message: impl Into<String>) -> Result<()> {
        let state = self.state.update_item(item_id, |item| item.fail(message)).await?;
        self.broadcast(item_id, ProgressEvent::Failed, state).await;
        Ok(())
    }

    pub async fn pause_item(&self, item_id: &str) -> Result<()> {
        let state = self.state.update_item(item_id, |item| item.pause()).await?;
        self.broadcast(item_id, ProgressEvent::Paused, state).await;
        Ok(())
    }

    pub async fn resume_item(&self, item_id: &str) -> Result<()> {
        let state = self.state.update_item(item_id, |item| item.resume()).await?;
        self.broadcast(item_id, ProgressEvent::Resumed, state).await;
        Ok(())
    }

    pub async fn skip_item(&self, item_id: &str, message: impl Into<String>) -> Result<()> {
        let state = self.state.update_item(item_id, |item| item.skip(message)).await?;
        self.broadcast(item_id, ProgressEvent::Skipped, state).await;
        Ok(())
    }

    pub async fn get_progress(&self, item_id: &str) -> Option<ProgressItemState> {
        self.state.get_item(item_id).await
    }

    pub async fn get_workflow_progress(&self, workflow_id: &str) -> Option<ProgressItemState> {
        self.state.get_item(workflow_id).await
    }

    pub async fn get_overall_progress(&self) -> HashMap<String, f64> {
        self.state.get_progress_summary().await
    }

    pub async fn eta_secs(&self, item_id: &str) -> Option<f64> {
        let current = self.state.get_item(item_id).await?;
        self.estimator.lock().await.eta_secs(item_id, current.percent_complete)
    }

    /// Saves the given workflow's subtree to a versioned, timestamped JSON
    /// checkpoint file, matching the Python reference's save/load naming
    /// convention.
    pub async fn save_checkpoint(&self, workflow_id: &str) -> Result<PathBuf> {
        let dir = self
            .checkpoint_dir
            .as_ref()
            .ok_or_else(|| RuntimeError::Internal("progress tracker has no checkpoint directory configured".into()))?;
        tokio::fs::create_dir_all(dir).await?;
        let tree = self.state.get_item_tree(workflow_id).await;
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let path = dir.join(format!("{workflow_id}_{timestamp}.json"));
        let json = serde_json::to_vec_pretty(&tree)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    /// Loads the most recent checkpoint file for `workflow_id`, falling
    /// back to the newest file matching the workflow id prefix if an exact
    /// match isn't found — mirroring the Python reference's glob fallback.
    pub async fn load_checkpoint(&self, workflow_id: &str) -> Result<Vec<ProgressItemState>> {
        let dir = self
            .checkpoint_dir
            .as_ref()
            .ok_or_else(|| RuntimeError::Internal("progress tracker has no checkpoint directory configured".into()))?;
        let mut candidates = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&format!("{workflow_id}_")) {
                candidates.push(entry.path());
            }
        }
        candidates.sort();
        let latest = candidates
            .pop()
            .ok_or_else(|| RuntimeError::Internal(format!("no checkpoint found for workflow {workflow_id}")))?;
        let bytes = tokio::fs::read(latest).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn broadcast(&self, item_id: &str, event: ProgressEvent, state: ProgressItemState) {
        let workflow_id = self
            .workflow_roots
            .read()
            .await
            .get(item_id)
            .cloned()
            .unwrap_or_else(|| item_id.to_string());
        let recipients = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, workflows)| workflows.iter().any(|w| w == &workflow_id))
            .map(|(session_id, _)| session_id.clone())
            .collect();
        let message = ProgressBroadcast {
            workflow_id,
            item_id: item_id.to_string(),
            event,
            state,
            recipients,
        };
        let _ = self.broadcast_tx.send(message);
    }

    /// Spawn the background checkpoint loop: periodically snapshots every
    /// known workflow root to disk until cancelled.
    pub fn spawn_checkpoint_loop(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        let token = self.cancellation.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let roots: Vec<String> = tracker
                            .workflow_roots
                            .read()
                            .await
                            .values()
                            .cloned()
                            .collect();
                        for workflow_id in roots {
                            if let Err(error) = tracker.save_checkpoint(&workflow_id).await {
                                debug!(%workflow_id, %error, "periodic progress checkpoint failed");
                            }
                        }
                    }
                }
            }
        })
    }

    pub fn stop_background_loops(&self) {
        self.cancellation.cancel();
        info!("progress tracker background loops stopped");
    }
}
