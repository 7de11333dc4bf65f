//! Conversation state and the registry that owns it

mod state;
mod store;

pub use state::{
    CommittedEntry, ConversationId, ConversationPhase, ConversationState, MessageId, PendingEntry,
};
pub use store::{ConversationHandle, ConversationSnapshot, ConversationStore};
