//! Delivery of completed files back to the conversation.

pub mod stage;
pub mod text;

pub use stage::{DeliveryReport, DeliverySettings, DeliveryStage, INLINE_MESSAGE_LIMIT};
