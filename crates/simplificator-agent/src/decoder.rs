//! Incremental UTF-8 decoding for byte streams whose chunk boundaries may
//! fall inside a multi-byte sequence.

use std::borrow::Cow;

use tracing::warn;

const REPLACEMENT: char = '\u{FFFD}';

/// Stateful decoder that carries an incomplete trailing sequence (at most
/// three bytes) over to the next chunk.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
    replaced: usize,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` as forms complete characters.
    ///
    /// Invalid sequences become U+FFFD; an incomplete tail is held back.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let bytes: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        out.push_str(text);
                    }
                    match e.error_len() {
                        Some(len) => {
                            self.replaced += 1;
                            warn!(bytes = len, "invalid UTF-8 in stream, substituting U+FFFD");
                            out.push(REPLACEMENT);
                            rest = &tail[len..];
                        }
                        None => {
                            self.pending.extend_from_slice(tail);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// End of input: an incomplete held-back sequence becomes a single U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        self.replaced += 1;
        REPLACEMENT.to_string()
    }

    /// Bytes currently held back awaiting the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of U+FFFD substitutions made so far.
    pub fn replaced(&self) -> usize {
        self.replaced
    }
}
