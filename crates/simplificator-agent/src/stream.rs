//! SSE-style line framing and the events a streamed chat response produces.

use serde::Serialize;

/// Prefix of a line that carries a payload.
pub const DATA_PREFIX: &str = "data: ";
/// Payload that ends the stream successfully.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Events emitted while assembling a streamed chat response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text content from the model.
    TextDelta { text: String },

    /// Stream ended, either on `[DONE]` or on a clean close.
    Done,

    /// Stream failed; nothing follows.
    Error {
        kind: StreamErrorKind,
        message: String,
    },
}

impl StreamEvent {
    /// True for `Done` and `Error`, the events that end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    pub fn as_text_delta(&self) -> Option<&str> {
        match self {
            Self::TextDelta { text } => Some(text),
            _ => None,
        }
    }
}

/// Failure classes of a streamed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorKind {
    /// Non-success status or missing body, before any chunk was read.
    RequestError,
    /// Connection drop or read failure mid-stream.
    TransportError,
    /// A data frame that never parsed. Logged and skipped, never terminal.
    MalformedFrame,
}

impl std::fmt::Display for StreamErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestError => write!(f, "request_error"),
            Self::TransportError => write!(f, "transport_error"),
            Self::MalformedFrame => write!(f, "malformed_frame"),
        }
    }
}

/// One line of the event stream, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// `:keep-alive` and friends.
    Comment(&'a str),
    /// Event separator.
    Blank,
    /// Untrimmed remainder after `data: `.
    Data(&'a str),
    /// `event:`, `id:`, `retry:` or anything unknown. Ignored.
    Other(&'a str),
}

/// Classify a single line (without its `\n`). A trailing `\r` is stripped.
pub fn classify_line(line: &str) -> Frame<'_> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() {
        Frame::Blank
    } else if let Some(comment) = line.strip_prefix(':') {
        Frame::Comment(comment)
    } else if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
        Frame::Data(payload)
    } else {
        Frame::Other(line)
    }
}

/// Text fragment at `choices[0].delta.content`, if present and non-empty.
pub fn delta_content(chunk: &serde_json::Value) -> Option<&str> {
    chunk
        .pointer("/choices/0/delta/content")
        .and_then(serde_json::Value::as_str)
        .filter(|text| !text.is_empty())
}

/// One delta in the chat-completion chunk shape.
pub fn delta_chunk(text: &str) -> serde_json::Value {
    serde_json::json!({
        "object": "chat.completion.chunk",
        "choices": [{ "index": 0, "delta": { "content": text } }],
    })
}

/// [`delta_chunk`] as a `data:` line plus the blank separator line.
pub fn encode_delta_frame(text: &str) -> String {
    format!("{DATA_PREFIX}{}\n\n", delta_chunk(text))
}
