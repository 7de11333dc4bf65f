//! Inbound messages and channel events

use crate::conversation::{ConversationId, MessageId};
use chrono::{DateTime, Utc};

/// A text message received from a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: ConversationId,
    pub message_id: MessageId,
    pub text: String,
    /// Platform send time, if known
    pub sent_at: Option<DateTime<Utc>>,
    /// Whether the sender is a bot (including ourselves)
    pub from_bot: bool,
}

impl InboundMessage {
    pub fn new(chat_id: ConversationId, message_id: MessageId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            message_id,
            text: text.into(),
            sent_at: None,
            from_bot: false,
        }
    }

    pub fn sent_at(mut self, sent_at: DateTime<Utc>) -> Self {
        self.sent_at = Some(sent_at);
        self
    }

    pub fn from_bot(mut self, from_bot: bool) -> Self {
        self.from_bot = from_bot;
        self
    }
}

/// Events emitted by channel adapters
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A text message arrived
    Message(InboundMessage),
    /// A message was pinned; `notice_id` is the service message announcing it
    Pinned {
        chat_id: ConversationId,
        message_id: MessageId,
        notice_id: MessageId,
        from_bot: bool,
    },
    /// A message was unpinned outside of our control
    Unpinned {
        chat_id: ConversationId,
        message_id: MessageId,
    },
    /// Adapter connected
    Connected { channel: String },
    /// Adapter disconnected
    Disconnected { channel: String, reason: String },
    /// Adapter-level error
    Error { channel: String, error: String },
}

impl ChannelEvent {
    /// Conversation the event belongs to, if any
    pub fn chat_id(&self) -> Option<ConversationId> {
        match self {
            ChannelEvent::Message(message) => Some(message.chat_id),
            ChannelEvent::Pinned { chat_id, .. } | ChannelEvent::Unpinned { chat_id, .. } => {
                Some(*chat_id)
            }
            ChannelEvent::Connected { .. }
            | ChannelEvent::Disconnected { .. }
            | ChannelEvent::Error { .. } => None,
        }
    }
}
