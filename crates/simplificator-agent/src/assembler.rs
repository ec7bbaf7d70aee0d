//! Streaming chat response assembler.
//!
//! Turns an arbitrarily chunked `data: {json}` event stream into an ordered
//! sequence of text deltas delivered to a [`StreamHandler`]. The assembler
//! only ever holds the unterminated tail of the input (plus a deferred data
//! line while one is being recovered), never the accumulated message.
//!
//! A data line whose JSON does not parse is kept and retried as more lines
//! arrive: producers that put a raw newline inside a JSON string split one
//! logical frame over several physical lines. Fragments are re-joined with
//! the newline restored, escaped when it fell inside a string.

use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::decoder::Utf8Decoder;
use crate::stream::{
    classify_line, delta_content, Frame, StreamErrorKind, StreamEvent, DONE_SENTINEL,
};

/// Default cap on a deferred data line before it is given up on.
pub const DEFAULT_MAX_DEFERRED_BYTES: usize = 1024 * 1024;

/// Receiver of assembled output.
///
/// `on_delta` is called zero or more times in arrival order, then exactly one
/// of `on_complete` / `on_error`, at most once per assembler.
pub trait StreamHandler {
    fn on_delta(&mut self, text: &str);

    fn on_complete(&mut self) {}

    fn on_error(&mut self, kind: StreamErrorKind, detail: &str) {
        let _ = (kind, detail);
    }
}

impl<H: StreamHandler + ?Sized> StreamHandler for &mut H {
    fn on_delta(&mut self, text: &str) {
        (**self).on_delta(text)
    }

    fn on_complete(&mut self) {
        (**self).on_complete()
    }

    fn on_error(&mut self, kind: StreamErrorKind, detail: &str) {
        (**self).on_error(kind, detail)
    }
}

/// Collects events so an async caller can forward them between reads.
impl StreamHandler for Vec<StreamEvent> {
    fn on_delta(&mut self, text: &str) {
        self.push(StreamEvent::TextDelta {
            text: text.to_string(),
        });
    }

    fn on_complete(&mut self) {
        self.push(StreamEvent::Done);
    }

    fn on_error(&mut self, kind: StreamErrorKind, detail: &str) {
        self.push(StreamEvent::Error {
            kind,
            message: detail.to_string(),
        });
    }
}

type DeltaFn<'a> = Box<dyn FnMut(&str) + Send + 'a>;
type CompleteFn<'a> = Box<dyn FnMut() + Send + 'a>;
type ErrorFn<'a> = Box<dyn FnMut(StreamErrorKind, &str) + Send + 'a>;

/// Closure-based handler; every callback is optional.
#[derive(Default)]
pub struct Callbacks<'a> {
    on_delta: Option<DeltaFn<'a>>,
    on_complete: Option<CompleteFn<'a>>,
    on_error: Option<ErrorFn<'a>>,
}

impl<'a> Callbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_delta(mut self, f: impl FnMut(&str) + Send + 'a) -> Self {
        self.on_delta = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnMut() + Send + 'a) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(StreamErrorKind, &str) + Send + 'a) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl StreamHandler for Callbacks<'_> {
    fn on_delta(&mut self, text: &str) {
        if let Some(f) = self.on_delta.as_mut() {
            f(text);
        }
    }

    fn on_complete(&mut self) {
        if let Some(f) = self.on_complete.as_mut() {
            f();
        }
    }

    fn on_error(&mut self, kind: StreamErrorKind, detail: &str) {
        if let Some(f) = self.on_error.as_mut() {
            f(kind, detail);
        }
    }
}

/// Lifecycle of a single assembled stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Idle,
    Streaming,
    Completed,
    Failed,
}

impl AssemblerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    /// Largest deferred data line kept for recovery.
    pub max_deferred_bytes: usize,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            max_deferred_bytes: DEFAULT_MAX_DEFERRED_BYTES,
        }
    }
}

/// Tracks whether the end of accumulated JSON text sits inside a string.
#[derive(Debug, Default, Clone, Copy)]
struct JsonScan {
    in_string: bool,
    escaped: bool,
}

impl JsonScan {
    fn feed(&mut self, text: &str) {
        // Multi-byte UTF-8 never contains ASCII bytes, so a byte scan is exact.
        for b in text.bytes() {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
            } else if b == b'"' {
                self.in_string = true;
            }
        }
    }
}

/// A data payload that did not parse yet, plus the lines appended to it.
#[derive(Debug)]
struct DeferredLine {
    joined: String,
    fragments: usize,
    scan: JsonScan,
}

impl DeferredLine {
    fn new(payload: &str) -> Self {
        let mut scan = JsonScan::default();
        scan.feed(payload);
        Self {
            joined: payload.to_string(),
            fragments: 1,
            scan,
        }
    }

    /// Size after appending `fragment` plus its separator.
    fn len_with(&self, fragment: &str) -> usize {
        self.joined.len() + 2 + fragment.len()
    }

    fn append(&mut self, fragment: &str) {
        if self.scan.in_string {
            if self.scan.escaped {
                // A backslash right before the newline: complete it as `\n`.
                self.joined.push('n');
                self.scan.escaped = false;
            } else {
                self.joined.push_str("\\n");
            }
        } else {
            self.joined.push('\n');
        }
        self.joined.push_str(fragment);
        self.scan.feed(fragment);
        self.fragments += 1;
    }
}

/// Single-use assembler for one logical stream.
pub struct StreamingAssembler<H: StreamHandler> {
    handler: H,
    state: AssemblerState,
    buffer: String,
    decoder: Utf8Decoder,
    deferred: Option<DeferredLine>,
    malformed: usize,
    options: AssemblerOptions,
}

impl<H: StreamHandler> StreamingAssembler<H> {
    pub fn new(handler: H) -> Self {
        Self::with_options(handler, AssemblerOptions::default())
    }

    pub fn with_options(handler: H, options: AssemblerOptions) -> Self {
        Self {
            handler,
            state: AssemblerState::Idle,
            buffer: String::new(),
            decoder: Utf8Decoder::new(),
            deferred: None,
            malformed: 0,
            options,
        }
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Bytes of input held back: the unterminated tail, any deferred data
    /// line, and an incomplete UTF-8 sequence.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
            + self.deferred.as_ref().map_or(0, |d| d.joined.len())
            + self.decoder.pending_len()
    }

    /// Data frames given up on so far.
    pub fn malformed_frames(&self) -> usize {
        self.malformed
    }

    /// Invalid UTF-8 sequences replaced with U+FFFD so far.
    pub fn replaced_chars(&self) -> usize {
        self.decoder.replaced()
    }

    /// Feed a decoded text chunk.
    pub fn push(&mut self, chunk: &str) {
        if !self.begin_push() {
            return;
        }
        self.buffer.push_str(chunk);
        self.drain_lines();
    }

    /// Feed a raw byte chunk; multi-byte characters may straddle chunks.
    pub fn push_bytes(&mut self, chunk: &[u8]) {
        if !self.begin_push() {
            return;
        }
        let text = self.decoder.decode(chunk);
        self.buffer.push_str(&text);
        self.drain_lines();
    }

    /// The transport closed cleanly without `[DONE]`.
    ///
    /// Remaining input is processed as if newline-terminated, with no further
    /// recovery: whatever still does not parse is dropped silently.
    pub fn finish(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = AssemblerState::Streaming;

        let tail = self.decoder.finish();
        if self.decoder.replaced() > 0 {
            debug!(replaced = self.decoder.replaced(), "invalid UTF-8 in stream replaced");
        }
        self.buffer.push_str(&tail);
        self.drain_lines();
        if self.state.is_terminal() {
            return;
        }

        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            self.process_line(&rest, true);
            if self.state.is_terminal() {
                return;
            }
        }

        if let Some(deferred) = self.deferred.take() {
            self.malformed += 1;
            debug!(
                bytes = deferred.joined.len(),
                fragments = deferred.fragments,
                "discarding unparsable trailing data frame at end of stream"
            );
        }
        self.complete();
    }

    /// The transport failed mid-stream (read error, reset, timeout).
    pub fn fail(&mut self, detail: &str) {
        if self.state.is_terminal() {
            debug!(detail, "transport failure after stream end ignored");
            return;
        }
        self.terminate(StreamErrorKind::TransportError, detail);
    }

    /// The request itself failed (non-success status, no body) before any
    /// chunk arrived. Ignored once streaming has begun.
    pub fn reject(&mut self, detail: &str) {
        if self.state != AssemblerState::Idle {
            debug!(state = ?self.state, detail, "request rejection after stream start ignored");
            return;
        }
        self.terminate(StreamErrorKind::RequestError, detail);
    }

    fn begin_push(&mut self) -> bool {
        if self.state.is_terminal() {
            trace!(state = ?self.state, "input after stream end ignored");
            return false;
        }
        self.state = AssemblerState::Streaming;
        true
    }

    fn drain_lines(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        let mut rest = buffer.as_str();
        while let Some(pos) = rest.find('\n') {
            let line = &rest[..pos];
            rest = &rest[pos + 1..];
            self.process_line(line, false);
            if self.state.is_terminal() {
                return;
            }
        }
        self.buffer.push_str(rest);
    }

    fn process_line(&mut self, raw: &str, flushing: bool) {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let frame = classify_line(line);

        if let Some(mut deferred) = self.deferred.take() {
            if let Frame::Data(_) = frame {
                self.drop_malformed(&deferred, "superseded by a new data frame");
            } else if deferred.len_with(line) > self.options.max_deferred_bytes {
                self.drop_malformed(&deferred, "exceeds the recovery limit");
            } else {
                deferred.append(line);
                match serde_json::from_str::<Value>(deferred.joined.trim()) {
                    Ok(chunk) => {
                        debug!(fragments = deferred.fragments, "recovered data frame split by raw newlines");
                        self.emit(&chunk);
                    }
                    Err(_) => self.deferred = Some(deferred),
                }
                return;
            }
        }

        match frame {
            Frame::Data(payload) => self.process_data(payload, flushing),
            Frame::Comment(_) | Frame::Blank => {}
            Frame::Other(other) => trace!(line = other, "ignoring non-data line"),
        }
    }

    fn process_data(&mut self, payload: &str, flushing: bool) {
        let trimmed = payload.trim();
        if trimmed == DONE_SENTINEL {
            self.complete();
            return;
        }
        if trimmed.is_empty() {
            return;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(chunk) => self.emit(&chunk),
            Err(e) if flushing => {
                self.malformed += 1;
                debug!(error = %e, "discarding unparsable trailing data frame at end of stream");
            }
            Err(e) => {
                trace!(error = %e, "data frame incomplete, waiting for more input");
                self.deferred = Some(DeferredLine::new(payload));
            }
        }
    }

    fn emit(&mut self, chunk: &Value) {
        if let Some(reported) = chunk.pointer("/error/message").and_then(Value::as_str) {
            warn!(error = reported, "gateway reported an error inside the stream");
        }
        if let Some(text) = delta_content(chunk) {
            self.handler.on_delta(text);
        }
    }

    fn drop_malformed(&mut self, deferred: &DeferredLine, reason: &str) {
        self.malformed += 1;
        warn!(
            kind = %StreamErrorKind::MalformedFrame,
            bytes = deferred.joined.len(),
            fragments = deferred.fragments,
            reason,
            "dropping data frame that never parsed"
        );
    }

    fn complete(&mut self) {
        self.state = AssemblerState::Completed;
        self.release();
        self.handler.on_complete();
    }

    fn terminate(&mut self, kind: StreamErrorKind, detail: &str) {
        self.state = AssemblerState::Failed;
        self.release();
        self.handler.on_error(kind, detail);
    }

    fn release(&mut self) {
        self.buffer = String::new();
        self.deferred = None;
    }
}

/// Drive an assembler from a byte stream until it ends or fails.
pub async fn drive_stream<S, B, E, H>(stream: S, assembler: &mut StreamingAssembler<H>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    H: StreamHandler,
{
    let mut stream = std::pin::pin!(stream);
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                assembler.push_bytes(bytes.as_ref());
                if assembler.state().is_terminal() {
                    return;
                }
            }
            Err(e) => {
                assembler.fail(&e.to_string());
                return;
            }
        }
    }
    assembler.finish();
}
