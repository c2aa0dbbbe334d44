// StreamProcessor: started -> per-item transform+format+progress -> one of
// complete/error/cancelled.
//
// Grounded in `original_source/core/streaming.py`'s StreamProcessor class.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::{Stream, StreamExt};

use super::chunk::{StreamChunk, StreamEvent, StreamFormat, StreamingConfig};
use super::service::StreamProgressAdapter;

/// Drives one stream's lifecycle: emits a `Started` chunk, one `Chunk` per
/// source item (optionally mirroring `progress` into a Progress Tracker
/// item via `progress_adapter`), then exactly one of `Complete`, `Error`,
/// or `Cancelled`.
///
/// **Supplemental fix (SPEC_FULL.md §2.H).** The Python reference's
/// cancellation check falls through to the `COMPLETE` branch instead of
/// emitting `CANCELLED`, contradicting its own documented intent. This
/// processor checks the cancellation flag before consuming each source
/// item and, if set, stops pulling from the source and yields a single
/// `Cancelled` chunk instead of `Complete`.
pub struct StreamProcessor {
    config: StreamingConfig,
    progress_adapter: Option<StreamProgressAdapter>,
    cancelled: Arc<AtomicBool>,
    completed: Arc<AtomicBool>,
    total_processed: Arc<AtomicU64>,
}

impl StreamProcessor {
    pub fn new(config: StreamingConfig) -> Self {
        StreamProcessor {
            config,
            progress_adapter: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            completed: Arc::new(AtomicBool::new(false)),
            total_processed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_progress_adapter(mut self, adapter: StreamProgressAdapter) -> Self {
        self.progress_adapter = Some(adapter);
        self
    }

    /// A cancellation handle a caller can hold onto (e.g. in a
    /// `StreamingService` registry) while the processor itself is consumed
    /// by `process_stream`.
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn completed_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.completed)
    }

    pub fn total_processed_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.total_processed)
    }

    pub fn total_processed(&self) -> u64 {
        self.total_processed.load(Ordering::SeqCst)
    }

    /// Consume `source`, yielding formatted wire frames (text lines for
    /// `Text`/`Json`/`Sse`, UTF-8-decoded lines for `Binary`) per `self.config`.
    ///
    /// Spawns a task that drives the lifecycle and pushes formatted frames
    /// into a channel, returned to the caller as a `Stream` — the same
    /// shape as Python's `async def stream_generator(): yield ...`, built
    /// from `tokio::sync::mpsc` since this crate carries no
    /// `async-stream`-style generator macro.
    pub fn process_stream<S>(self, mut source: S) -> impl Stream<Item = String>
    where
        S: Stream<Item = serde_json::Value> + Send + Unpin + 'static,
    {
        let (tx, rx) = tokio::sync::mpsc::channel::<String>(64);
        tokio::spawn(async move {
            let mut event_id: u64 = 0;
            let _ = tx.send(self.format(&StreamChunk::new(StreamEvent::Started), event_id)).await;
            event_id += 1;

            if let Some(adapter) = &self.progress_adapter {
                adapter.initialize().await;
            }

            while !self.cancelled.load(Ordering::SeqCst) {
                match source.next().await {
                    Some(item) => {
                        let mut chunk = StreamChunk::new(StreamEvent::Chunk).delta(item);
                        if let Some(adapter) = &self.progress_adapter {
                            let progress = (event_id as f64 + 1.0).min(99.0);
                            chunk = chunk.progress(progress);
                            adapter.update(progress).await;
                        }
                        if tx.send(self.format(&chunk, event_id)).await.is_err() {
                            return;
                        }
                        event_id += 1;
                        self.total_processed.fetch_add(1, Ordering::SeqCst);
                    }
                    None => break,
                }
            }

            if self.cancelled.load(Ordering::SeqCst) {
                if let Some(adapter) = &self.progress_adapter {
                    adapter.fail("stream cancelled").await;
                }
                let _ = tx.send(self.format(&StreamChunk::new(StreamEvent::Cancelled), event_id)).await;
            } else {
                if let Some(adapter) = &self.progress_adapter {
                    adapter.complete().await;
                }
                let _ = tx.send(self.format(&StreamChunk::new(StreamEvent::Complete), event_id)).await;
            }
            self.completed.store(true, Ordering::SeqCst);
        });
        tokio_stream::wrappers::ReceiverStream::new(rx)
    }

    fn format(&self, chunk: &StreamChunk, id: u64) -> String {
        match self.config.format {
            StreamFormat::Sse => chunk.to_sse_event(id),
            StreamFormat::Json => chunk.to_json_line(),
            StreamFormat::Text => chunk
                .delta
                .as_ref()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| chunk.to_json_line()),
            StreamFormat::Binary => chunk.to_json_line(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn emits_started_chunks_then_complete() {
        let processor = StreamProcessor::new(StreamingConfig::json());
        let source = stream::iter(vec![serde_json::json!("a"), serde_json::json!("b")]);
        let lines: Vec<String> = processor.process_stream(Box::pin(source)).collect().await;
        assert!(lines[0].contains("\"started\""));
        assert!(lines.last().unwrap().contains("\"complete\""));
        assert_eq!(lines.len(), 4);
    }

    #[tokio::test]
    async fn cancellation_emits_cancelled_not_complete() {
        let processor = StreamProcessor::new(StreamingConfig::json());
        let handle = processor.cancellation_handle();
        handle.store(true, Ordering::SeqCst);
        let source = stream::iter(vec![serde_json::json!("a")]);
        let lines: Vec<String> = processor.process_stream(Box::pin(source)).collect().await;
        assert!(lines.last().unwrap().contains("\"cancelled\""));
    }
}
