//! Incremental decoder for streamed chat completions.
//!
//! [`StreamingChatDecoder`] consumes the raw body of an `ai-chat` response and
//! grows the trailing assistant message of a [`Conversation`] one fragment at
//! a time. Fragments are read from `choices[0].delta.content` of each
//! `data:` record.
//!
//! The decoder is split in two layers:
//! - [`StreamingChatDecoder::feed`] and [`StreamingChatDecoder::finish`] are
//!   synchronous and operate on byte slices, so chunking behaviour can be
//!   tested without a runtime.
//! - [`StreamingChatDecoder::decode`] drives them from a byte stream and
//!   honours a [`CancellationToken`].

use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::client::ClientError;
use crate::model::Conversation;
use crate::sse::{classify_line, LineBuffer, SseLine, Utf8Decoder};

/// JSON pointer of the text fragment inside a completion chunk.
pub const FRAGMENT_POINTER: &str = "/choices/0/delta/content";

/// Read the content fragment out of one `data:` payload.
///
/// Returns `Ok(None)` when the record parses but carries no (or empty)
/// content, and `Err` when the payload is not valid JSON.
///
/// # Example
/// ```
/// use inkstream::decoder::extract_fragment;
///
/// let payload = r#"{"choices":[{"delta":{"content":"Hi"}}]}"#;
/// assert_eq!(extract_fragment(payload).unwrap().as_deref(), Some("Hi"));
/// assert_eq!(extract_fragment(r#"{"choices":[]}"#).unwrap(), None);
/// assert!(extract_fragment(r#"{"choices":[{"del"#).is_err());
/// ```
pub fn extract_fragment(payload: &str) -> Result<Option<String>, serde_json::Error> {
    let record: Value = serde_json::from_str(payload)?;
    Ok(record
        .pointer(FRAGMENT_POINTER)
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map(str::to_owned))
}

/// Destination the decoder writes assistant content into.
pub trait ConversationSink {
    /// Apply `f`; the closure reports whether it changed anything.
    fn update<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(&mut Conversation) -> bool;
}

impl ConversationSink for Conversation {
    fn update<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(&mut Conversation) -> bool,
    {
        f(self)
    }
}

/// Sink publishing every change to the receivers of a watch channel.
pub struct WatchSink<'a>(&'a watch::Sender<Conversation>);

impl<'a> WatchSink<'a> {
    pub fn new(sender: &'a watch::Sender<Conversation>) -> Self {
        Self(sender)
    }
}

impl ConversationSink for WatchSink<'_> {
    fn update<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(&mut Conversation) -> bool,
    {
        self.0.send_if_modified(f)
    }
}

/// How a decode session ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The body reached end-of-stream. `sentinel` tells whether `[DONE]` was seen.
    Completed { fragments: usize, sentinel: bool },
    /// The cancellation token fired before the body ended.
    Cancelled { fragments: usize },
}

impl DecodeOutcome {
    pub fn fragments(&self) -> usize {
        match self {
            DecodeOutcome::Completed { fragments, .. } | DecodeOutcome::Cancelled { fragments } => {
                *fragments
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DecodeOutcome::Cancelled { .. })
    }
}

/// Decoder state for one exchange.
#[derive(Debug, Default)]
pub struct StreamingChatDecoder {
    utf8: Utf8Decoder,
    buffer: LineBuffer,
    assistant_content: String,
    fragments: usize,
    saw_done: bool,
    /// The first buffered line was put back after failing to parse.
    requeued: bool,
}

impl StreamingChatDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content accumulated so far for this exchange.
    pub fn assistant_content(&self) -> &str {
        &self.assistant_content
    }

    /// Number of fragments applied so far.
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Whether the `[DONE]` sentinel was seen.
    pub fn saw_done(&self) -> bool {
        self.saw_done
    }

    /// Decode one body chunk and apply the fragments of every complete line.
    ///
    /// Returns whether the conversation changed.
    pub fn feed<K: ConversationSink>(&mut self, chunk: &[u8], sink: &mut K) -> bool {
        if self.saw_done {
            return false;
        }
        let text = self.utf8.decode(chunk);
        self.buffer.push_str(&text);
        self.drain_lines(sink, false)
    }

    /// End-of-stream handling.
    ///
    /// Complete lines still queued are processed one last time, with
    /// malformed payloads dropped. Text that never got a line terminator is
    /// discarded.
    pub fn finish<K: ConversationSink>(&mut self, sink: &mut K) -> bool {
        if self.saw_done {
            self.buffer.clear();
            return false;
        }
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);
        let changed = self.drain_lines(sink, true);

        if !self.buffer.is_empty() {
            debug!(
                bytes = self.buffer.len(),
                "discarding unterminated line at end of stream"
            );
            self.buffer.clear();
        }
        changed
    }

    /// Read `stream` to the end, applying fragments to `sink` as they arrive.
    ///
    /// # Errors
    /// Any error yielded by the stream ends the session as
    /// [`ClientError::StreamInterrupted`]. Content already applied stays.
    pub async fn decode<S, B, K>(
        mut self,
        stream: S,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<DecodeOutcome, ClientError>
    where
        S: Stream<Item = Result<B, ClientError>>,
        B: AsRef<[u8]>,
        K: ConversationSink,
    {
        let mut stream = Box::pin(stream);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(fragments = self.fragments, "chat stream cancelled");
                    return Ok(DecodeOutcome::Cancelled { fragments: self.fragments });
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    self.feed(chunk.as_ref(), sink);
                }
                Some(Err(err)) => {
                    warn!(error = %err, fragments = self.fragments, "chat stream interrupted");
                    return Err(err.interrupted());
                }
                None => {
                    self.finish(sink);
                    debug!(
                        fragments = self.fragments,
                        sentinel = self.saw_done,
                        "chat stream ended"
                    );
                    return Ok(DecodeOutcome::Completed {
                        fragments: self.fragments,
                        sentinel: self.saw_done,
                    });
                }
            }
        }
    }

    /// Apply every complete line in the buffer.
    ///
    /// `[DONE]` ends extraction for the whole exchange: the rest of the
    /// buffer and every later chunk are ignored, even if more records follow.
    fn drain_lines<K: ConversationSink>(&mut self, sink: &mut K, final_pass: bool) -> bool {
        let mut changed = false;
        let mut retrying = std::mem::take(&mut self.requeued);

        while let Some(line) = self.buffer.next_line() {
            let is_retry = std::mem::take(&mut retrying);

            let payload = match classify_line(&line) {
                SseLine::Data(payload) => payload,
                SseLine::Done => {
                    debug!("received [DONE]");
                    self.saw_done = true;
                    self.buffer.clear();
                    break;
                }
                skipped => {
                    trace!(?skipped, "skipping line");
                    continue;
                }
            };

            match extract_fragment(payload) {
                Ok(Some(fragment)) => {
                    changed |= self.apply(&fragment, sink);
                }
                Ok(None) => trace!("record carries no content"),
                Err(err) if final_pass || is_retry => {
                    warn!(error = %err, line = %line, "dropping malformed record");
                }
                Err(err) => {
                    trace!(error = %err, "incomplete record, waiting for more data");
                    self.buffer.requeue_line(&line);
                    self.requeued = true;
                    break;
                }
            }
        }
        changed
    }

    fn apply<K: ConversationSink>(&mut self, fragment: &str, sink: &mut K) -> bool {
        self.assistant_content.push_str(fragment);
        self.fragments += 1;

        let content = self.assistant_content.as_str();
        sink.update(|conversation| {
            if !conversation.replace_open(content) {
                conversation.open_assistant(content);
            }
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use bytes::Bytes;
    use futures::stream;

    fn record(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    fn decode_chunks<C: AsRef<[u8]>>(chunks: &[C]) -> (Conversation, StreamingChatDecoder) {
        let mut conversation = Conversation::new();
        conversation.push_user("hello");
        let mut decoder = StreamingChatDecoder::new();
        for chunk in chunks {
            decoder.feed(chunk.as_ref(), &mut conversation);
        }
        decoder.finish(&mut conversation);
        (conversation, decoder)
    }

    fn assistant_messages(conversation: &Conversation) -> Vec<&str> {
        conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
            .collect()
    }

    #[test]
    fn single_record_yields_one_message() {
        let (conversation, _) =
            decode_chunks(&["data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n"]);
        assert_eq!(assistant_messages(&conversation), vec!["Hi"]);
    }

    #[test]
    fn fragments_accumulate_until_done() {
        let (conversation, decoder) = decode_chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n",
            "data: [DONE]\n",
        ]);
        assert_eq!(assistant_messages(&conversation), vec!["AB"]);
        assert!(decoder.saw_done());
        assert_eq!(decoder.fragments(), 2);
    }

    #[test]
    fn fragments_replace_rather_than_append_messages() {
        let (conversation, _) = decode_chunks(&[record("Hel"), record("lo")]);
        assert_eq!(conversation.len(), 2);
        assert_eq!(assistant_messages(&conversation), vec!["Hello"]);
        assert_eq!(conversation.open_message().unwrap().content, "Hello");
    }

    #[test]
    fn record_split_at_every_offset_decodes_the_same() {
        let body = format!("{}{}", record("Olá, "), record("tattoo 🖋"));
        let bytes = body.as_bytes();

        for offset in 1..bytes.len() {
            let (head, tail) = bytes.split_at(offset);
            let (conversation, _) = decode_chunks(&[head, tail]);
            assert_eq!(
                assistant_messages(&conversation),
                vec!["Olá, tattoo 🖋"],
                "split at byte {offset}"
            );
        }
    }

    #[test]
    fn byte_by_byte_delivery_matches_concatenation() {
        let fragments = ["Black", "work ", "and ", "fine ", "line"];
        let body: String = fragments.iter().map(|f| record(f)).collect();
        let chunks: Vec<[u8; 1]> = body.bytes().map(|b| [b]).collect();

        let (conversation, decoder) = decode_chunks(&chunks);
        assert_eq!(assistant_messages(&conversation), vec![fragments.concat()]);
        assert_eq!(decoder.fragments(), fragments.len());
    }

    #[test]
    fn comments_blank_and_foreign_lines_are_skipped() {
        let body = format!(
            ": keep-alive\n\n   \r\nevent: message\nid: 7\ndata: {{\"choices\":[]}}\n{}",
            record("ok")
        );
        let (conversation, decoder) = decode_chunks(&[body]);
        assert_eq!(assistant_messages(&conversation), vec!["ok"]);
        assert_eq!(decoder.fragments(), 1);
    }

    #[test]
    fn crlf_terminated_lines_are_accepted() {
        let body = record("crlf").replace('\n', "\r\n");
        let (conversation, _) = decode_chunks(&[body]);
        assert_eq!(assistant_messages(&conversation), vec!["crlf"]);
    }

    #[test]
    fn empty_content_is_not_a_fragment() {
        let (conversation, decoder) = decode_chunks(&[record(""), record("x"), record("")]);
        assert_eq!(assistant_messages(&conversation), vec!["x"]);
        assert_eq!(decoder.fragments(), 1);
    }

    #[test]
    fn done_stops_extraction_for_the_exchange() {
        let body = format!("{}data: [DONE]\n{}", record("kept"), record("ignored"));
        let (conversation, decoder) = decode_chunks(&[body, record("late")]);
        assert_eq!(assistant_messages(&conversation), vec!["kept"]);
        assert!(decoder.saw_done());
    }

    #[test]
    fn done_without_fragments_adds_no_message() {
        let (conversation, decoder) = decode_chunks(&["data: [DONE]\n"]);
        assert!(assistant_messages(&conversation).is_empty());
        assert!(decoder.saw_done());
    }

    #[test]
    fn unterminated_trailing_line_is_dropped() {
        let body = record("first");
        let trailing = record("lost");
        let (conversation, _) = decode_chunks(&[body, trailing.trim_end().to_string()]);
        assert_eq!(assistant_messages(&conversation), vec!["first"]);
    }

    #[test]
    fn malformed_record_is_requeued_then_dropped() {
        let mut conversation = Conversation::new();
        let mut decoder = StreamingChatDecoder::new();

        // The valid record after the broken one waits for the next chunk.
        let first = format!("data: {{\"choices\":[{{\"del\n{}", record("A"));
        assert!(!decoder.feed(first.as_bytes(), &mut conversation));
        assert!(conversation.is_empty());

        assert!(decoder.feed(record("B").as_bytes(), &mut conversation));
        assert_eq!(assistant_messages(&conversation), vec!["AB"]);

        decoder.finish(&mut conversation);
        assert_eq!(assistant_messages(&conversation), vec!["AB"]);
    }

    #[test]
    fn lines_behind_a_requeued_record_survive_end_of_stream() {
        let body = format!("data: not json\n{}", record("saved"));
        let (conversation, _) = decode_chunks(&[body]);
        assert_eq!(assistant_messages(&conversation), vec!["saved"]);
    }

    #[tokio::test]
    async fn decode_reads_stream_to_completion() {
        let chunks: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::from(record("A"))),
            Ok(Bytes::from(record("B"))),
            Ok(Bytes::from_static(b"data: [DONE]\n")),
        ];
        let mut conversation = Conversation::new();
        let cancel = CancellationToken::new();

        let outcome = StreamingChatDecoder::new()
            .decode(stream::iter(chunks), &mut conversation, &cancel)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DecodeOutcome::Completed {
                fragments: 2,
                sentinel: true
            }
        );
        assert_eq!(assistant_messages(&conversation), vec!["AB"]);
    }

    #[tokio::test]
    async fn decode_keeps_partial_content_on_read_error() {
        let chunks: Vec<Result<Bytes, ClientError>> = vec![
            Ok(Bytes::from(record("partial"))),
            Err(ClientError::StreamInterrupted("connection reset".into())),
            Ok(Bytes::from(record("never"))),
        ];
        let mut conversation = Conversation::new();

        let err = StreamingChatDecoder::new()
            .decode(stream::iter(chunks), &mut conversation, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::StreamInterrupted(_)));
        assert_eq!(assistant_messages(&conversation), vec!["partial"]);
    }

    #[tokio::test]
    async fn decode_stops_when_cancelled() {
        let first = stream::iter(vec![Ok::<_, ClientError>(Bytes::from(record("so far")))]);
        let body = first.chain(stream::pending());
        let mut conversation = Conversation::new();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        let decoding = StreamingChatDecoder::new().decode(body, &mut conversation, &cancel);
        let (outcome, _) = tokio::join!(decoding, async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });

        assert_eq!(outcome.unwrap(), DecodeOutcome::Cancelled { fragments: 1 });
        assert_eq!(assistant_messages(&conversation), vec!["so far"]);
    }

    #[tokio::test]
    async fn watch_sink_publishes_each_fragment() {
        let (sender, mut receiver) = watch::channel(Conversation::new());
        let mut sink = WatchSink::new(&sender);
        let mut decoder = StreamingChatDecoder::new();

        assert!(decoder.feed(record("one").as_bytes(), &mut sink));
        assert!(receiver.has_changed().unwrap());
        assert_eq!(receiver.borrow_and_update().last().unwrap().content, "one");

        assert!(!decoder.feed(b": ping\n", &mut sink));
        assert!(!receiver.has_changed().unwrap());
    }
}
