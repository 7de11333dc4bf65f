//! Conversation registry

use super::state::{
    CommittedEntry, ConversationId, ConversationPhase, ConversationState, MessageId, PendingEntry,
};
use crate::aggregator::render_summary;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Shared handle to one conversation's state
pub type ConversationHandle = Arc<Mutex<ConversationState>>;

/// Point-in-time copy of a conversation, for the HTTP API
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSnapshot {
    pub conversation_id: ConversationId,
    pub phase: ConversationPhase,
    pub pending: Vec<PendingEntry>,
    pub committed: Vec<CommittedEntry>,
    pub summary_id: Option<MessageId>,
    pub summary: String,
    pub flush_scheduled: bool,
}

/// Owns every conversation's state, one entry per conversation id.
///
/// The map lock is only held for lookups and inserts; all work on a
/// conversation happens under that conversation's own mutex, so
/// conversations never wait on each other.
pub struct ConversationStore {
    conversations: Arc<RwLock<HashMap<ConversationId, ConversationHandle>>>,
}

impl ConversationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the state for a conversation, creating it on first use
    pub async fn get_or_create(&self, id: ConversationId) -> ConversationHandle {
        if let Some(handle) = self.conversations.read().await.get(&id) {
            return handle.clone();
        }

        let mut conversations = self.conversations.write().await;
        conversations
            .entry(id)
            .or_insert_with(|| {
                tracing::debug!(chat_id = id, "Created conversation state");
                Arc::new(Mutex::new(ConversationState::new()))
            })
            .clone()
    }

    /// Get the state for a conversation without creating it
    pub async fn get(&self, id: ConversationId) -> Option<ConversationHandle> {
        self.conversations.read().await.get(&id).cloned()
    }

    /// Drop a conversation from the registry
    pub async fn remove(&self, id: ConversationId) -> bool {
        self.conversations.write().await.remove(&id).is_some()
    }

    /// Number of known conversations
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }

    /// Known conversation ids
    pub async fn ids(&self) -> Vec<ConversationId> {
        let mut ids: Vec<_> = self.conversations.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Drop every conversation
    pub async fn clear(&self) {
        let count = {
            let mut conversations = self.conversations.write().await;
            let count = conversations.len();
            conversations.clear();
            count
        };
        if count > 0 {
            tracing::info!("Dropped {} conversations", count);
        }
    }

    /// Copy a conversation's current state
    pub async fn snapshot(&self, id: ConversationId) -> Option<ConversationSnapshot> {
        let handle = self.get(id).await?;
        let state = handle.lock().await;
        Some(ConversationSnapshot {
            conversation_id: id,
            phase: state.phase(),
            pending: state.pending().to_vec(),
            committed: state.committed().to_vec(),
            summary_id: state.summary_id(),
            summary: render_summary(state.committed()),
            flush_scheduled: state.flush_scheduled(),
        })
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
