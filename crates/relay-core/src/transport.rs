//! ChatTransport trait definition.
//!
//! Implementations live in relay-infra (e.g., `TelegramTransport`).

use relay_types::conversation::{ConversationId, InboundMessage, MessageId, TextFormat};
use relay_types::error::TransportError;

/// Trait for chat platforms the relay talks through.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ChatTransport: Send + Sync {
    /// Fetch the next batch of inbound messages. May block (long polling)
    /// and may return an empty batch.
    fn poll_updates(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<InboundMessage>, TransportError>> + Send;

    /// Send a new text message and return its id for later edits.
    fn send_text(
        &self,
        conversation: ConversationId,
        text: &str,
        format: TextFormat,
    ) -> impl std::future::Future<Output = Result<MessageId, TransportError>> + Send;

    /// Replace the text of a previously sent message.
    fn edit_text(
        &self,
        conversation: ConversationId,
        message: MessageId,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Upload `bytes` as a file attachment named `filename`.
    fn send_document(
        &self,
        conversation: ConversationId,
        bytes: Vec<u8>,
        filename: &str,
        caption: &str,
    ) -> impl std::future::Future<Output = Result<MessageId, TransportError>> + Send;
}
