//! # inkstream - studio assistant client
//!
//! Client side of a tattoo studio's AI assistant: a streamed chat that grows
//! the assistant's answer fragment by fragment, plus the idea-card and image
//! generation functions hosted next to it.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Incremental decoding of event-stream chat completions, tolerant of
//!   records and UTF-8 characters split across chunks
//! - Chat sessions with a single exchange in flight, cancellation and
//!   fallback messaging
//! - Watch-channel snapshots for a rendering layer
//!
//! ## Architecture
//!
//! - **`sse`**: line buffering, UTF-8 continuation, line classification
//! - **`decoder`**: [`StreamingChatDecoder`] applies `choices[0].delta.content`
//!   fragments to a [`Conversation`]
//! - **`session`**: [`ChatSession`] state machine (`Idle`, `Sending`,
//!   `StreamOpen`, `Error`)
//! - **`providers`**: [`FunctionsClient`], the HTTP [`ChatTransport`]
//!
//! ## Example
//! ```no_run
//! use inkstream::options::{FunctionsConfig, TransportOptions};
//! use inkstream::providers::FunctionsClient;
//! use inkstream::session::ChatSession;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FunctionsConfig::new("https://studio.example.com", "publishable-key");
//!     let client = FunctionsClient::new(config, TransportOptions::default())?;
//!     let session = ChatSession::new(client);
//!
//!     let mut updates = session.subscribe();
//!     tokio::spawn(async move {
//!         while updates.changed().await.is_ok() {
//!             if let Some(last) = updates.borrow_and_update().last() {
//!                 println!("{}: {}", last.role, last.content);
//!             }
//!         }
//!     });
//!
//!     session.send("Which styles do you tattoo?", &CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod decoder;
pub mod http;
pub mod model;
pub mod options;
pub mod providers;
pub mod session;
pub mod sse;

// Re-exports for convenience
pub use client::{ByteStream, ChatTransport, ClientError};
pub use decoder::{DecodeOutcome, StreamingChatDecoder};
pub use model::{ChatMessage, Conversation, Role};
pub use providers::FunctionsClient;
pub use session::{ChatSession, SessionState};
