//! Conversation state and wire records exchanged with the studio's AI functions.

use std::fmt;

use itertools::Itertools;
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};

/// Role of the message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered, append-only message history of a chat session.
///
/// At most one assistant message is open (still receiving fragments) at a
/// time, and while open it is always the last message. Appending any other
/// message closes it first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    open: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a complete user message.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.close_open();
        self.messages.push(ChatMessage::user(content));
    }

    /// Append a complete (already closed) assistant message.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.close_open();
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Append a new assistant message that stays open for further content.
    pub fn open_assistant(&mut self, content: impl Into<String>) {
        self.close_open();
        self.messages.push(ChatMessage::assistant(content));
        self.open = true;
    }

    /// Replace the content of the open assistant message.
    ///
    /// Returns `false` (and changes nothing) when no message is open.
    pub fn replace_open(&mut self, content: &str) -> bool {
        match self.open_message_mut() {
            Some(message) => {
                message.content.clear();
                message.content.push_str(content);
                true
            }
            None => false,
        }
    }

    /// Close the open assistant message. Returns whether one was open.
    pub fn close_open(&mut self) -> bool {
        std::mem::replace(&mut self.open, false)
    }

    /// The assistant message currently receiving fragments.
    pub fn open_message(&self) -> Option<&ChatMessage> {
        if self.open {
            self.messages.last()
        } else {
            None
        }
    }

    fn open_message_mut(&mut self) -> Option<&mut ChatMessage> {
        if self.open {
            self.messages.last_mut()
        } else {
            None
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Count of messages with the given role.
    pub fn count(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }
}

impl fmt::Display for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let transcript = self
            .messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .join("\n");
        f.write_str(&transcript)
    }
}

/// Body of an `ai-chat` request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: NonEmpty<ChatMessage>,
}

impl ChatRequest {
    /// Returns `None` for an empty history; the function rejects those.
    pub fn from_history(messages: &[ChatMessage]) -> Option<Self> {
        NonEmpty::from_slice(messages).map(|messages| Self { messages })
    }
}

/// Body of an `ai-suggest` request.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestRequest<'a> {
    pub context: &'a str,
}

/// A tattoo idea returned by `ai-suggest`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Suggestion {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub placement: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SuggestResponse {
    #[serde(default)]
    pub suggestions: Option<Vec<Suggestion>>,
}

/// Body of an `ai-generate-image` request.
#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest<'a> {
    pub prompt: &'a str,
}

/// Result of `ai-generate-image`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Either a hosted URL or a `data:` URL with the encoded image.
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ImageResponse {
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
