//! Conversation-side types: identities, inbound messages, and the
//! per-conversation state enum.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable key identifying one chat participant/thread across messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-assigned identifier of an outbound message (used for edits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message received from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub conversation_id: ConversationId,
    /// Human-readable sender label (username or display name), for logs.
    pub sender_label: String,
    pub text: String,
    /// Lower-cased command name without the leading `/`, when the message is
    /// a command.
    pub command: Option<String>,
}

impl InboundMessage {
    pub fn is_command(&self) -> bool {
        self.command.is_some()
    }
}

/// How the transport should render outbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextFormat {
    #[default]
    Plain,
    /// Transport-side HTML subset (`<b>`, `<pre>`, ...). Callers escape content.
    Html,
}

/// Where a conversation currently is in the fetch workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingLocator,
    SelectingFiles,
    Fetching,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationState::Idle => write!(f, "idle"),
            ConversationState::AwaitingLocator => write!(f, "awaiting_locator"),
            ConversationState::SelectingFiles => write!(f, "selecting_files"),
            ConversationState::Fetching => write!(f, "fetching"),
        }
    }
}
