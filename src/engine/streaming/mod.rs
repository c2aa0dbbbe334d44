// Streaming Service: chunked response streaming with progress mirroring
// and cooperative cancellation.
//
// Grounded in `original_source/core/streaming.py` in full, and in this
// crate's `llm::streaming` teacher module's session/channel registry shape.

//! # Streaming Service
//!
//! Wraps an arbitrary async item source into a lifecycle of
//! started/chunk/progress/complete (or cancelled/error) frames formatted
//! for text, JSON-lines, SSE, or binary delivery, optionally mirroring
//! progress into a [`crate::ProgressTracker`] item. See SPEC_FULL.md §2.H.

pub mod chunk;
pub mod processor;
pub mod service;

pub use chunk::{StreamChunk, StreamEncoding, StreamEvent, StreamFormat, StreamingConfig};
pub use processor::StreamProcessor;
pub use service::{StreamId, StreamInfo, StreamProgressAdapter, StreamingService};
