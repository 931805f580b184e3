//! Telegram Bot API wire types.
//!
//! Only the fields the relay reads or writes are modelled; unknown fields
//! are ignored on input.

use serde::{Deserialize, Serialize};

use relay_types::conversation::{ConversationId, InboundMessage};
use relay_types::error::TransportError;

/// Envelope wrapping every Bot API response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseParameters {
    #[serde(default)]
    pub retry_after: Option<u64>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the envelope into the result or a typed transport error.
    pub fn into_result(self) -> Result<T, TransportError> {
        if self.ok {
            return self
                .result
                .ok_or_else(|| TransportError::Deserialization("response has no result".into()));
        }

        let code = self.error_code.unwrap_or_default();
        if code == 429 {
            return Err(TransportError::RateLimited {
                retry_after_secs: self.parameters.and_then(|p| p.retry_after),
            });
        }
        Err(TransportError::Api {
            code,
            description: self.description.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
}

impl Message {
    /// The command name when the message starts with a `bot_command`
    /// entity: lower-cased, without the `/` and any `@botname` suffix.
    pub fn command(&self) -> Option<String> {
        let text = self.text.as_deref()?;
        let leading = self
            .entities
            .iter()
            .any(|e| e.kind == "bot_command" && e.offset == 0);
        if !leading {
            return None;
        }

        let token = text.split_whitespace().next()?.strip_prefix('/')?;
        let name = token.split('@').next().unwrap_or(token);
        Some(name.to_lowercase())
    }

    fn sender_label(&self) -> String {
        match &self.from {
            Some(User {
                username: Some(username),
                ..
            }) => username.clone(),
            Some(user) if !user.first_name.is_empty() => user.first_name.clone(),
            Some(user) => user.id.to_string(),
            None => "unknown".to_string(),
        }
    }

    /// Convert into the transport-neutral form. Messages without text
    /// (stickers, photos, ...) yield `None`.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        let command = self.command();
        let sender_label = self.sender_label();
        let text = self.text?;
        Some(InboundMessage {
            conversation_id: ConversationId(self.chat.id),
            sender_label,
            text,
            command,
        })
    }
}

/// Body of `getUpdates`.
#[derive(Debug, Clone, Serialize)]
pub struct GetUpdatesRequest {
    pub offset: i64,
    pub timeout: u64,
    pub allowed_updates: &'static [&'static str],
}

/// Body of `sendMessage`.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'static str>,
}

/// Body of `editMessageText`.
#[derive(Debug, Clone, Serialize)]
pub struct EditMessageTextRequest<'a> {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: &'a str,
}

/// The subset of a sent message we need back.
#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}
