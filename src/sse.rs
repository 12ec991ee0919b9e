//! Server-Sent Events (SSE) line handling for chat completion streams.
//!
//! The assistant function answers with an event-stream style body:
//! ```text
//! : keep-alive
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! This module owns the pieces below the decoder: turning raw bytes into text
//! across chunk boundaries ([`Utf8Decoder`]), cutting that text into lines
//! ([`LineBuffer`]) and classifying each line ([`classify_line`]).

use bytes::{Buf, BytesMut};

/// Prefix carried by every data record.
pub const DATA_PREFIX: &str = "data: ";

/// Payload marking the end of an exchange.
pub const DONE_MARKER: &str = "[DONE]";

/// What a single, already terminated line means to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// Empty or whitespace-only line (event separator).
    Blank,
    /// `:`-prefixed comment or keep-alive.
    Comment,
    /// Any line without the `data: ` prefix.
    Unrecognized,
    /// The `[DONE]` sentinel.
    Done,
    /// Trimmed payload of a data record.
    Data(&'a str),
}

/// Classify a line whose terminator (and trailing `\r`) was already removed.
pub fn classify_line(line: &str) -> SseLine<'_> {
    if line.trim().is_empty() {
        return SseLine::Blank;
    }
    if line.starts_with(':') {
        return SseLine::Comment;
    }
    match parse_sse_line(line) {
        Some(data) if is_done_marker(data) => SseLine::Done,
        Some(data) => SseLine::Data(data),
        None => SseLine::Unrecognized,
    }
}

/// Parse an SSE line to extract the data portion.
///
/// SSE lines are in the format: `data: <content>`
///
/// # Example
/// ```
/// use inkstream::sse::parse_sse_line;
///
/// let line = "data: {\"key\": \"value\"}";
/// assert_eq!(parse_sse_line(line), Some("{\"key\": \"value\"}"));
///
/// let line = "event: ping";
/// assert_eq!(parse_sse_line(line), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX).map(|s| s.trim())
}

/// Check if an SSE data payload indicates the exchange is done.
///
/// # Example
/// ```
/// use inkstream::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(!is_done_marker(""));
/// assert!(!is_done_marker("{\"choices\": []}"));
/// ```
pub fn is_done_marker(data: &str) -> bool {
    data == DONE_MARKER
}

/// Text received so far that has not been consumed as complete lines.
///
/// Lines are read through a cursor so extracting many short lines from a
/// large chunk does not shift the whole buffer each time. Consumed text is
/// compacted away on the next write.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    text: String,
    start: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append decoded text.
    pub fn push_str(&mut self, text: &str) {
        self.compact();
        self.text.push_str(text);
    }

    /// Remove and return the next complete line.
    ///
    /// The `\n` terminator is dropped, as is a single `\r` right before it.
    /// Returns `None` when no terminator is buffered.
    pub fn next_line(&mut self) -> Option<String> {
        let offset = self.text[self.start..].find('\n')?;
        let end = self.start + offset;
        let mut line = &self.text[self.start..end];
        if let Some(stripped) = line.strip_suffix('\r') {
            line = stripped;
        }
        let line = line.to_owned();
        self.start = end + 1;
        Some(line)
    }

    /// Put a line back in front of the pending text, terminator included.
    ///
    /// The next call to [`LineBuffer::next_line`] returns it again.
    pub fn requeue_line(&mut self, line: &str) {
        self.compact();
        let mut text = String::with_capacity(line.len() + 1 + self.text.len());
        text.push_str(line);
        text.push('\n');
        text.push_str(&self.text);
        self.text = text;
    }

    /// Pending text that does not form a complete line yet.
    pub fn remainder(&self) -> &str {
        &self.text[self.start..]
    }

    pub fn len(&self) -> usize {
        self.text.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.start = 0;
    }

    fn compact(&mut self) {
        if self.start > 0 {
            self.text.drain(..self.start);
            self.start = 0;
        }
    }
}

/// Incremental UTF-8 decoder.
///
/// A multi-byte character split across two chunks is held back until its
/// remaining bytes arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: BytesMut,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` (plus held bytes) as forms complete characters.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());

        loop {
            let err = match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => err,
            };

            let valid = err.valid_up_to();
            if let Ok(text) = std::str::from_utf8(&self.pending[..valid]) {
                out.push_str(text);
            }

            match err.error_len() {
                Some(invalid) => {
                    out.push(char::REPLACEMENT_CHARACTER);
                    self.pending.advance(valid + invalid);
                }
                // Incomplete sequence at the end: wait for the next chunk.
                None => {
                    self.pending.advance(valid);
                    return out;
                }
            }
        }
    }

    /// Flush bytes still held at end of input.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    /// Number of bytes held back waiting for continuation.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
