//! Client error type and the transport seam used by chat sessions.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::model::ChatMessage;

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The chat request failed, returned a non-success status, or had no body.
    #[error("Connection error: {message}")]
    Connection {
        status: Option<u16>,
        message: String,
    },

    /// The response body failed while it was being read.
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("A message is already being sent")]
    Busy,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Conversation has no messages")]
    EmptyConversation,
}

impl ClientError {
    /// HTTP status attached to a connection failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Connection { status, .. } => *status,
            ClientError::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the exchange failed on the wire: the request was refused or
    /// the body broke off. Only these get the session's fallback message.
    pub fn is_stream_failure(&self) -> bool {
        matches!(
            self,
            ClientError::Connection { .. } | ClientError::StreamInterrupted(_)
        )
    }

    /// Wrap a mid-stream failure, keeping it as-is if already classified.
    pub fn interrupted(self) -> Self {
        match self {
            err @ ClientError::StreamInterrupted(_) => err,
            other => ClientError::StreamInterrupted(other.to_string()),
        }
    }
}

/// Raw response body of a chat request, chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Opens the streamed response of a chat exchange.
///
/// This is the seam between [`ChatSession`](crate::session::ChatSession) and
/// the network. The HTTP implementation is
/// [`FunctionsClient`](crate::providers::FunctionsClient); tests script the
/// byte stream directly.
///
/// # Contract
/// - Return `ClientError::Connection` when the request cannot be made, the
///   status is not a success, or there is no body. Nothing must have been
///   read from the body at that point.
/// - Errors yielded by the stream are mid-stream failures.
///
/// # Example
/// ```rust,ignore
/// struct Canned(&'static str);
///
/// #[async_trait]
/// impl ChatTransport for Canned {
///     async fn open_chat_stream(&self, _: &[ChatMessage]) -> Result<ByteStream, ClientError> {
///         Ok(futures::stream::iter([Ok(Bytes::from_static(self.0.as_bytes()))]).boxed())
///     }
/// }
/// ```
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the full history and return the response body once headers arrive.
    async fn open_chat_stream(&self, messages: &[ChatMessage]) -> Result<ByteStream, ClientError>;
}
