//! TelegramTransport -- concrete [`ChatTransport`] over the Telegram Bot API.
//!
//! Uses long polling (`getUpdates`) for inbound messages and plain JSON
//! calls for outbound ones; attachments go through `sendDocument` as
//! multipart form data.
//!
//! The bot token is part of every request URL. It is held as a
//! [`SecretString`] and stripped from any `reqwest` error before the error is
//! surfaced or logged.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;

use relay_core::transport::ChatTransport;
use relay_types::config::TelegramConfig;
use relay_types::conversation::{ConversationId, InboundMessage, MessageId, TextFormat};
use relay_types::error::TransportError;

use super::types::{
    ApiResponse, EditMessageTextRequest, GetUpdatesRequest, Message, SendMessageRequest,
    SentMessage, Update, User,
};

/// Extra time allowed on top of the long-poll timeout, and the floor for
/// uploads of large attachments.
const REQUEST_SLACK: Duration = Duration::from_secs(30);
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct TelegramTransport {
    client: reqwest::Client,
    token: SecretString,
    api_base: String,
    poll_timeout_secs: u64,
    /// Next `getUpdates` offset: one past the highest update id seen.
    offset: AtomicI64,
}

// No Debug derive: the token must never reach formatted output.

impl TelegramTransport {
    pub fn new(token: SecretString, config: &TelegramConfig) -> Result<Self, TransportError> {
        let timeout =
            (Duration::from_secs(config.poll_timeout_secs) + REQUEST_SLACK).max(MIN_REQUEST_TIMEOUT);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            poll_timeout_secs: config.poll_timeout_secs,
            offset: AtomicI64::new(0),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token.expose_secret(), method)
    }

    async fn call<B, R>(&self, method: &str, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(http_error)?;
        Self::parse(response).await
    }

    async fn parse<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, TransportError> {
        let status = response.status();
        let envelope: ApiResponse<R> = response.json().await.map_err(|e| {
            TransportError::Deserialization(format!(
                "failed to parse response (HTTP {status}): {}",
                e.without_url()
            ))
        })?;
        envelope.into_result()
    }

    /// `getMe`: the bot account the token belongs to. A rejected token
    /// surfaces as `TransportError::Api` with code 401.
    pub async fn get_me(&self) -> Result<User, TransportError> {
        self.call("getMe", &serde_json::json!({})).await
    }

    /// Advance the offset past every update in `updates`.
    fn acknowledge(&self, updates: &[Update]) {
        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.fetch_max(last + 1, Ordering::SeqCst);
        }
    }
}

fn http_error(e: reqwest::Error) -> TransportError {
    TransportError::Http(e.without_url().to_string())
}

fn parse_mode(format: TextFormat) -> Option<&'static str> {
    match format {
        TextFormat::Plain => None,
        TextFormat::Html => Some("HTML"),
    }
}

/// Editing a message to its current text is rejected by the API; the edit
/// has nonetheless taken effect.
fn is_not_modified(err: &TransportError) -> bool {
    matches!(err, TransportError::Api { code: 400, description } if description.contains("message is not modified"))
}

impl ChatTransport for TelegramTransport {
    async fn poll_updates(&self) -> Result<Vec<InboundMessage>, TransportError> {
        let request = GetUpdatesRequest {
            offset: self.offset.load(Ordering::SeqCst),
            timeout: self.poll_timeout_secs,
            allowed_updates: &["message"],
        };
        let updates: Vec<Update> = self.call("getUpdates", &request).await?;
        self.acknowledge(&updates);

        let inbound: Vec<InboundMessage> = updates
            .into_iter()
            .filter_map(|u| u.message)
            .filter_map(Message::into_inbound)
            .collect();
        if !inbound.is_empty() {
            tracing::debug!(count = inbound.len(), "received updates");
        }
        Ok(inbound)
    }

    async fn send_text(
        &self,
        conversation: ConversationId,
        text: &str,
        format: TextFormat,
    ) -> Result<MessageId, TransportError> {
        let request = SendMessageRequest {
            chat_id: conversation.0,
            text,
            parse_mode: parse_mode(format),
        };
        let sent: SentMessage = self.call("sendMessage", &request).await?;
        Ok(MessageId(sent.message_id))
    }

    async fn edit_text(
        &self,
        conversation: ConversationId,
        message: MessageId,
        text: &str,
    ) -> Result<(), TransportError> {
        let request = EditMessageTextRequest {
            chat_id: conversation.0,
            message_id: message.0,
            text,
        };
        match self
            .call::<_, serde_json::Value>("editMessageText", &request)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn send_document(
        &self,
        conversation: ConversationId,
        bytes: Vec<u8>,
        filename: &str,
        caption: &str,
    ) -> Result<MessageId, TransportError> {
        let size = bytes.len();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("chat_id", conversation.0.to_string())
            .text("caption", caption.to_string())
            .part("document", part);

        tracing::debug!(%conversation, file = filename, size, "uploading document");
        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(http_error)?;
        let sent: SentMessage = Self::parse(response).await?;
        Ok(MessageId(sent.message_id))
    }
}
