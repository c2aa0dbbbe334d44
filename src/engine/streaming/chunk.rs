// Streaming data model: the event/format/config types a stream processor
// formats chunks against.
//
// Grounded in `original_source/core/streaming.py`'s StreamEvent,
// StreamFormat, StreamEncoding, and StreamingConfig.

use serde::{Deserialize, Serialize};

/// Lifecycle event a [`super::processor::StreamProcessor`] emits per chunk.
/// `spec.md` §5 requires a dedicated `Cancelled` variant distinct from
/// `Complete` — see SPEC_FULL.md §2.H's cancellation supplemental fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEvent {
    Started,
    Progress,
    Chunk,
    Error,
    Complete,
    Cancelled,
}

/// Output encoding a stream processor renders chunks into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFormat {
    Text,
    Json,
    Binary,
    Sse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamEncoding {
    Utf8,
    Ascii,
    Latin1,
}

/// Configuration for a streaming response. Compression is deliberately not
/// modeled: `spec.md` names no compression requirement and the Python
/// reference's `StreamCompression` plumbing never compressed anything while
/// emitting an invalid content-type header — see SPEC_FULL.md §2.H.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    pub format: StreamFormat,
    pub encoding: StreamEncoding,
    pub chunk_size: usize,
    pub keep_alive: std::time::Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        StreamingConfig {
            format: StreamFormat::Text,
            encoding: StreamEncoding::Utf8,
            chunk_size: 1024,
            keep_alive: std::time::Duration::from_secs(15),
        }
    }
}

impl StreamingConfig {
    pub fn sse() -> Self {
        StreamingConfig {
            format: StreamFormat::Sse,
            ..Default::default()
        }
    }

    pub fn json() -> Self {
        StreamingConfig {
            format: StreamFormat::Json,
            ..Default::default()
        }
    }

    pub fn binary() -> Self {
        StreamingConfig {
            format: StreamFormat::Binary,
            ..Default::default()
        }
    }

    /// The HTTP `Content-Type` header this config's format+encoding implies.
    /// Unlike the Python reference, never concatenates a compression token.
    pub fn content_type(&self) -> String {
        match self.format {
            StreamFormat::Text => format!("text/plain; charset={}", encoding_name(self.encoding)),
            StreamFormat::Json => format!("application/json; charset={}", encoding_name(self.encoding)),
            StreamFormat::Sse => format!("text/event-stream; charset={}", encoding_name(self.encoding)),
            StreamFormat::Binary => "application/octet-stream".to_string(),
        }
    }

    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Content-Type", self.content_type()),
            ("Cache-Control", "no-cache".to_string()),
            ("Connection", "keep-alive".to_string()),
        ];
        if self.format == StreamFormat::Sse {
            headers.push(("X-Accel-Buffering", "no".to_string()));
        }
        headers
    }
}

fn encoding_name(encoding: StreamEncoding) -> &'static str {
    match encoding {
        StreamEncoding::Utf8 => "utf-8",
        StreamEncoding::Ascii => "ascii",
        StreamEncoding::Latin1 => "latin-1",
    }
}

/// A single chunk of a stream, carrying whatever payload and metadata apply
/// to its event kind. `delta`/`data` are kept as `serde_json::Value` rather
/// than generic over `T` (the Python reference's `StreamChunk[T]`) since
/// every consumer in this crate already serializes to JSON or SSE text —
/// a type parameter would buy nothing a caller could use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub event: StreamEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamChunk {
    pub fn new(event: StreamEvent) -> Self {
        StreamChunk {
            event,
            delta: None,
            data: None,
            progress: None,
            metadata: serde_json::Map::new(),
            error: None,
        }
    }

    pub fn delta(mut self, delta: impl Into<serde_json::Value>) -> Self {
        self.delta = Some(delta.into());
        self
    }

    pub fn data(mut self, data: impl Into<serde_json::Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        let mut chunk = StreamChunk::new(StreamEvent::Error);
        chunk.error = Some(message.into());
        chunk
    }

    /// Render as a Server-Sent Events wire frame.
    pub fn to_sse_event(&self, id: u64) -> String {
        let event_name = match self.event {
            StreamEvent::Started => "started",
            StreamEvent::Progress => "progress",
            StreamEvent::Chunk => "chunk",
            StreamEvent::Error => "error",
            StreamEvent::Complete => "complete",
            StreamEvent::Cancelled => "cancelled",
        };
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("id: {id}\nevent: {event_name}\ndata: {data}\n\n")
    }

    pub fn to_json_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        line
    }
}
