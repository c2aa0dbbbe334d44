// StreamingService: creates and tracks active stream processors, and
// mirrors their progress into a Progress Tracker item.
//
// Grounded in `original_source/core/streaming.py`'s StreamProgressAdapter
// and StreamingService classes, and in this crate's `llm::streaming`
// teacher module's `StreamingManager` session/channel registry shape.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::engine::progress::ProgressTracker;
use crate::{Result, RuntimeError};

use super::chunk::{StreamFormat, StreamingConfig};
use super::processor::StreamProcessor;

pub type StreamId = String;

/// Lazily creates a Progress Tracker operation item for an active stream
/// and mirrors its lifecycle into it. Matches `StreamProgressAdapter` in
/// `streaming.py`, including its lazy-initialize-on-first-use behavior.
pub struct StreamProgressAdapter {
    tracker: Arc<ProgressTracker>,
    workflow_id: String,
    parent_id: String,
    name: String,
    item_id: tokio::sync::Mutex<Option<String>>,
}

impl StreamProgressAdapter {
    pub fn new(tracker: Arc<ProgressTracker>, workflow_id: impl Into<String>, parent_id: impl Into<String>, name: impl Into<String>) -> Self {
        StreamProgressAdapter {
            tracker,
            workflow_id: workflow_id.into(),
            parent_id: parent_id.into(),
            name: name.into(),
            item_id: tokio::sync::Mutex::new(None),
        }
    }

    async fn ensure_item(&self) -> String {
        let mut guard = self.item_id.lock().await;
        if let Some(id) = guard.as_ref() {
            return id.clone();
        }
        let id = self
            .tracker
            .create_operation(&self.workflow_id, &self.parent_id, self.name.clone(), 1.0)
            .await
            .unwrap_or_else(|_| self.parent_id.clone());
        let _ = self.tracker.start_item(&id).await;
        *guard = Some(id.clone());
        id
    }

    pub async fn initialize(&self) -> String {
        self.ensure_item().await
    }

    pub async fn update(&self, progress: f64) {
        let id = self.ensure_item().await;
        let _ = self.tracker.update_progress(&id, progress, None).await;
    }

    pub async fn complete(&self) {
        let id = self.ensure_item().await;
        let _ = self.tracker.complete_item(&id, false).await;
    }

    pub async fn fail(&self, message: impl Into<String>) {
        let id = self.ensure_item().await;
        let _ = self.tracker.fail_item(&id, message.into()).await;
    }
}

/// Point-in-time snapshot of an active stream's status, returned by
/// [`StreamingService::get_active_streams_info`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct StreamInfo {
    pub id: StreamId,
    pub format: StreamFormat,
    pub started_at: DateTime<Utc>,
    pub items_processed: u64,
    pub completed: bool,
    pub cancelled: bool,
}

struct StreamHandle {
    format: StreamFormat,
    started_at: DateTime<Utc>,
    cancelled: Arc<AtomicBool>,
    completed: Arc<AtomicBool>,
    items_processed: Arc<AtomicU64>,
}

/// Creates and tracks active stream processors. One `StreamingService`
/// typically lives for the lifetime of the runtime, shared behind an `Arc`
/// the way the reference crate's `StreamingManager` is.
pub struct StreamingService {
    progress_tracker: Option<Arc<ProgressTracker>>,
    active_streams: DashMap<StreamId, StreamHandle>,
}

impl StreamingService {
    pub fn new(progress_tracker: Option<Arc<ProgressTracker>>) -> Self {
        StreamingService {
            progress_tracker,
            active_streams: DashMap::new(),
        }
    }

    fn build_processor(
        &self,
        config: StreamingConfig,
        progress_parent: Option<(&str, &str)>,
        progress_name: &str,
    ) -> (StreamId, StreamProcessor) {
        let id = Uuid::new_v4().to_string();
        let mut processor = StreamProcessor::new(config.clone());

        if let (Some(tracker), Some((workflow_id, parent_id))) = (&self.progress_tracker, progress_parent) {
            let adapter = StreamProgressAdapter::new(Arc::clone(tracker), workflow_id, parent_id, progress_name);
            processor = processor.with_progress_adapter(adapter);
        }

        let handle = StreamHandle {
            format: config.format,
            started_at: Utc::now(),
            cancelled: processor.cancellation_handle(),
            completed: processor.completed_handle(),
            items_processed: processor.total_processed_handle(),
        };
        self.active_streams.insert(id.clone(), handle);
        (id, processor)
    }

    /// Create a text streaming response: returns the stream id (for
    /// `cancel_stream`) and the formatted-line stream itself.
    pub fn create_text_response<S>(
        &self,
        source: S,
        progress_parent: Option<(&str, &str)>,
        progress_name: &str,
    ) -> (StreamId, impl Stream<Item = String>)
    where
        S: Stream<Item = serde_json::Value> + Send + Unpin + 'static,
    {
        let (id, processor) = self.build_processor(StreamingConfig::default(), progress_parent, progress_name);
        (id, processor.process_stream(source))
    }

    pub fn create_json_response<S>(
        &self,
        source: S,
        progress_parent: Option<(&str, &str)>,
        progress_name: &str,
    ) -> (StreamId, impl Stream<Item = String>)
    where
        S: Stream<Item = serde_json::Value> + Send + Unpin + 'static,
    {
        let (id, processor) = self.build_processor(StreamingConfig::json(), progress_parent, progress_name);
        (id, processor.process_stream(source))
    }

    pub fn create_binary_response<S>(
        &self,
        source: S,
        progress_parent: Option<(&str, &str)>,
        progress_name: &str,
    ) -> (StreamId, impl Stream<Item = String>)
    where
        S: Stream<Item = serde_json::Value> + Send + Unpin + 'static,
    {
        let (id, processor) = self.build_processor(StreamingConfig::binary(), progress_parent, progress_name);
        (id, processor.process_stream(source))
    }

    pub fn create_sse_response<S>(
        &self,
        source: S,
        progress_parent: Option<(&str, &str)>,
        progress_name: &str,
    ) -> (StreamId, impl Stream<Item = String>)
    where
        S: Stream<Item = serde_json::Value> + Send + Unpin + 'static,
    {
        let (id, processor) = self.build_processor(StreamingConfig::sse(), progress_parent, progress_name);
        (id, processor.process_stream(source))
    }

    /// Forwards a stream to a WebSocket sink, choosing the wire encoding by
    /// `config.format`: `Binary` frames carry the formatted chunk's UTF-8
    /// bytes as a `Message::Binary`; every other format sends
    /// `Message::Text`. Grounded in `streaming.py`'s `stream_to_websocket`.
    /// Returns once the underlying stream completes, errors, or the sink
    /// rejects a send.
    pub async fn stream_to_websocket<S, Sk>(
        &self,
        source: S,
        config: StreamingConfig,
        socket: &mut Sk,
        progress_parent: Option<(&str, &str)>,
        progress_name: &str,
    ) -> Result<StreamId>
    where
        S: Stream<Item = serde_json::Value> + Send + Unpin + 'static,
        Sk: Sink<Message> + Unpin,
        Sk::Error: std::fmt::Display,
    {
        let binary = config.format == StreamFormat::Binary;
        let (id, processor) = self.build_processor(config, progress_parent, progress_name);
        let mut frames = processor.process_stream(source);
        while let Some(frame) = frames.next().await {
            let message = if binary {
                Message::Binary(frame.into_bytes())
            } else {
                Message::Text(frame)
            };
            socket
                .send(message)
                .await
                .map_err(|e| RuntimeError::Internal(format!("websocket send failed: {e}")))?;
        }
        Ok(id)
    }

    /// Sets the checked-between-items cancellation flag for `stream_id`.
    /// Returns `Err(StreamNotFound)` if the id isn't (or is no longer) active.
    pub fn cancel_stream(&self, stream_id: &str) -> Result<()> {
        let handle = self
            .active_streams
            .get(stream_id)
            .ok_or_else(|| RuntimeError::StreamNotFound { id: stream_id.to_string() })?;
        handle.cancelled.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn get_active_streams_info(&self) -> Vec<StreamInfo> {
        self.active_streams
            .iter()
            .map(|entry| StreamInfo {
                id: entry.key().clone(),
                format: entry.value().format,
                started_at: entry.value().started_at,
                items_processed: entry.value().items_processed.load(Ordering::SeqCst),
                completed: entry.value().completed.load(Ordering::SeqCst),
                cancelled: entry.value().cancelled.load(Ordering::SeqCst),
            })
            .collect()
    }

    /// Drops bookkeeping for streams that finished (successfully or via
    /// cancellation). Callers poll this periodically; unlike the Python
    /// reference's per-call `finally: del active_streams[id]`, cleanup here
    /// is a separate sweep so `get_active_streams_info` can still report a
    /// just-finished stream's terminal status to a caller that asks first.
    pub fn sweep_finished(&self) {
        self.active_streams.retain(|_, handle| !handle.completed.load(Ordering::SeqCst));
    }
}
