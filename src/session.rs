//! Chat session: one exchange in flight at a time over a shared conversation.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ChatTransport, ClientError};
use crate::decoder::{DecodeOutcome, StreamingChatDecoder, WatchSink};
use crate::model::{ChatMessage, Conversation};

/// Assistant message appended when an exchange fails.
pub const FALLBACK_MESSAGE: &str = "Sorry, something went wrong. Please try again.";

/// Lifecycle of a [`ChatSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Request dispatched, waiting for the response headers.
    Sending,
    /// Response accepted, body being decoded.
    StreamOpen,
    /// The last exchange failed. Accepts a new send like `Idle`.
    Error,
}

impl SessionState {
    /// Whether an exchange is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionState::Sending | SessionState::StreamOpen)
    }
}

/// Chat with the studio assistant.
///
/// The session owns the conversation and publishes it through a watch
/// channel, so a renderer can [`subscribe`](ChatSession::subscribe) and
/// redraw on every fragment. Only one [`send`](ChatSession::send) runs at a
/// time; concurrent calls get [`ClientError::Busy`].
///
/// # Example
/// ```no_run
/// use inkstream::providers::FunctionsClient;
/// use inkstream::session::ChatSession;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), inkstream::ClientError> {
/// let session = ChatSession::new(FunctionsClient::from_env()?);
/// let cancel = CancellationToken::new();
///
/// session.send("Do you take walk-ins?", &cancel).await?;
/// println!("{}", session.conversation());
/// # Ok(())
/// # }
/// ```
pub struct ChatSession<T> {
    transport: T,
    conversation: watch::Sender<Conversation>,
    state: watch::Sender<SessionState>,
    fallback_message: String,
}

impl<T: ChatTransport> ChatSession<T> {
    pub fn new(transport: T) -> Self {
        Self::with_conversation(transport, Conversation::new())
    }

    /// Resume from an existing history.
    pub fn with_conversation(transport: T, conversation: Conversation) -> Self {
        let (conversation, _) = watch::channel(conversation);
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            transport,
            conversation,
            state,
            fallback_message: FALLBACK_MESSAGE.to_string(),
        }
    }

    /// Replace the message shown when an exchange fails.
    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Receiver notified on every change to the conversation.
    pub fn subscribe(&self) -> watch::Receiver<Conversation> {
        self.conversation.subscribe()
    }

    /// Snapshot of the conversation.
    pub fn conversation(&self) -> Conversation {
        self.conversation.borrow().clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.conversation.borrow().messages().to_vec()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a user message and stream the assistant's answer into the conversation.
    ///
    /// On a connection or mid-stream failure the partial answer is kept, the
    /// fallback message is appended after it and the session moves to
    /// [`SessionState::Error`]. Other errors move to `Error` without it.
    /// Cancelling `cancel` ends the exchange quietly.
    ///
    /// # Errors
    /// - [`ClientError::EmptyMessage`] for blank input, before any change.
    /// - [`ClientError::Busy`] while another exchange is in flight.
    /// - Whatever the transport or decoder reported for the exchange.
    pub async fn send(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<DecodeOutcome, ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let acquired = self.state.send_if_modified(|state| {
            if state.is_busy() {
                false
            } else {
                *state = SessionState::Sending;
                true
            }
        });
        if !acquired {
            return Err(ClientError::Busy);
        }
        let mut guard = InFlight {
            state: &self.state,
            conversation: &self.conversation,
            next: SessionState::Idle,
        };

        self.conversation.send_modify(|conversation| conversation.push_user(text));
        let history = self.messages();

        let result = self.exchange(&history, cancel).await;

        guard.next = match &result {
            Ok(outcome) => {
                info!(
                    fragments = outcome.fragments(),
                    cancelled = outcome.is_cancelled(),
                    "chat exchange finished"
                );
                SessionState::Idle
            }
            Err(err) if err.is_stream_failure() => {
                warn!(error = %err, "chat exchange failed");
                self.conversation.send_modify(|conversation| {
                    conversation.push_assistant(self.fallback_message.as_str())
                });
                SessionState::Error
            }
            Err(err) => {
                warn!(error = %err, "chat exchange rejected");
                SessionState::Error
            }
        };

        result
    }

    async fn exchange(
        &self,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<DecodeOutcome, ClientError> {
        debug!(messages = history.len(), "dispatching chat request");

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("chat request cancelled before the response");
                return Ok(DecodeOutcome::Cancelled { fragments: 0 });
            }
            body = self.transport.open_chat_stream(history) => body?,
        };

        debug!("chat stream open");
        self.state.send_replace(SessionState::StreamOpen);

        let mut sink = WatchSink::new(&self.conversation);
        StreamingChatDecoder::new().decode(body, &mut sink, cancel).await
    }
}

/// Closes the exchange when `send` returns or its future is dropped.
struct InFlight<'a> {
    state: &'a watch::Sender<SessionState>,
    conversation: &'a watch::Sender<Conversation>,
    next: SessionState,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.conversation.send_if_modified(Conversation::close_open);
        self.state.send_replace(self.next);
    }
}
