//! Outbound messaging seam and the inbound event model.
//!
//! Conversation handlers talk to the messaging service only through [`Messenger`],
//! and only consume [`InboundEvent`]s, so they run unchanged against Telegram or
//! against a recording fake.

use async_trait::async_trait;
use teloxide::types::{ChatId, MessageId, ReplyMarkup};

use crate::clinic_model::GeoPoint;
use crate::errors::TransportError;

/// Outbound capability of the messaging transport
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a text message, optionally with a reply or inline keyboard
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<ReplyMarkup>,
    ) -> Result<(), TransportError>;

    /// Replace the text of a previously sent message
    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), TransportError>;

    /// Acknowledge a button press so the client clears its loading state
    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError>;
}

/// An event delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Text {
        chat_id: ChatId,
        text: String,
    },
    Location {
        chat_id: ChatId,
        point: GeoPoint,
    },
    Callback {
        chat_id: ChatId,
        /// Message carrying the pressed button, when still accessible
        message_id: Option<MessageId>,
        callback_id: String,
        data: String,
    },
}

impl InboundEvent {
    pub fn chat_id(&self) -> ChatId {
        match self {
            InboundEvent::Text { chat_id, .. }
            | InboundEvent::Location { chat_id, .. }
            | InboundEvent::Callback { chat_id, .. } => *chat_id,
        }
    }

    /// Callback id to acknowledge, for button presses
    pub fn callback_id(&self) -> Option<&str> {
        match self {
            InboundEvent::Callback { callback_id, .. } => Some(callback_id),
            _ => None,
        }
    }
}
