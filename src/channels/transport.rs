//! Chat operations the aggregation engine needs from a messaging platform

use crate::conversation::{ConversationId, MessageId};
use crate::error::Result;
use async_trait::async_trait;

/// Outbound side of a messaging platform.
///
/// Every method may fail; callers decide how failures degrade. Implementors
/// must not retry internally, the engine bounds each call with its own
/// timeout.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name, for logs
    fn name(&self) -> &str;

    /// Post a message and return its id
    async fn send_text(&self, chat_id: ConversationId, text: &str) -> Result<MessageId>;

    /// Replace the text of an existing message
    async fn edit_text(&self, chat_id: ConversationId, message_id: MessageId, text: &str)
        -> Result<()>;

    async fn delete_message(&self, chat_id: ConversationId, message_id: MessageId) -> Result<()>;

    /// Pin a message; `silent` suppresses the member notification
    async fn pin_message(
        &self,
        chat_id: ConversationId,
        message_id: MessageId,
        silent: bool,
    ) -> Result<()>;

    async fn unpin_message(
        &self,
        chat_id: ConversationId,
        message_id: MessageId,
        silent: bool,
    ) -> Result<()>;

    /// The conversation's current pinned message, as the platform sees it
    async fn pinned_message_id(&self, chat_id: ConversationId) -> Result<Option<MessageId>>;
}
