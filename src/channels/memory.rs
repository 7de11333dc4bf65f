//! In-process transport
//!
//! Keeps every conversation's messages and pins in memory. Used by the
//! `simulate` command and by tests, which can inject failures and latency
//! per operation.

use super::transport::ChatTransport;
use crate::conversation::{ConversationId, MessageId};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Transport operations, for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOp {
    Send,
    Edit,
    Delete,
    Pin,
    Unpin,
    PinnedQuery,
}

#[derive(Debug, Default)]
struct MemoryChat {
    messages: BTreeMap<MessageId, String>,
    /// Pinned messages, most recent last
    pinned: Vec<MessageId>,
}

#[derive(Debug, Default)]
struct MemoryState {
    chats: HashMap<ConversationId, MemoryChat>,
    failing: HashSet<TransportOp>,
    calls: HashMap<TransportOp, usize>,
    latency: Option<Duration>,
}

/// Transport backed by in-memory chats
#[derive(Debug)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    next_id: AtomicI64,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            next_id: AtomicI64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent call of `op` fail
    pub fn fail(&self, op: TransportOp) {
        self.lock().failing.insert(op);
    }

    /// Undo [`fail`](Self::fail)
    pub fn recover(&self, op: TransportOp) {
        self.lock().failing.remove(&op);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// How many times `op` was attempted
    pub fn calls(&self, op: TransportOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Simulate a user posting a message; returns its id
    pub fn post_user_message(&self, chat_id: ConversationId, text: &str) -> MessageId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .chats
            .entry(chat_id)
            .or_default()
            .messages
            .insert(id, text.to_string());
        id
    }

    /// Text of a message, if it still exists
    pub fn message(&self, chat_id: ConversationId, message_id: MessageId) -> Option<String> {
        self.lock()
            .chats
            .get(&chat_id)
            .and_then(|chat| chat.messages.get(&message_id).cloned())
    }

    /// Texts of all messages still present in a chat, oldest first
    pub fn texts(&self, chat_id: ConversationId) -> Vec<String> {
        self.lock()
            .chats
            .get(&chat_id)
            .map(|chat| chat.messages.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of messages still present in a chat
    pub fn message_count(&self, chat_id: ConversationId) -> usize {
        self.lock()
            .chats
            .get(&chat_id)
            .map(|chat| chat.messages.len())
            .unwrap_or(0)
    }

    /// The chat's current pinned message
    pub fn pinned(&self, chat_id: ConversationId) -> Option<MessageId> {
        self.lock()
            .chats
            .get(&chat_id)
            .and_then(|chat| chat.pinned.last().copied())
    }

    /// Text of the current pinned message
    pub fn pinned_text(&self, chat_id: ConversationId) -> Option<String> {
        let id = self.pinned(chat_id)?;
        self.message(chat_id, id)
    }

    /// Simulate a member unpinning everything
    pub fn unpin_all(&self, chat_id: ConversationId) {
        if let Some(chat) = self.lock().chats.get_mut(&chat_id) {
            chat.pinned.clear();
        }
    }

    /// Simulate a member deleting a message
    pub fn remove_message(&self, chat_id: ConversationId, message_id: MessageId) {
        if let Some(chat) = self.lock().chats.get_mut(&chat_id) {
            chat.messages.remove(&message_id);
            chat.pinned.retain(|id| *id != message_id);
        }
    }

    async fn begin(&self, op: TransportOp) -> Result<()> {
        let latency = {
            let mut state = self.lock();
            *state.calls.entry(op).or_default() += 1;
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.lock().failing.contains(&op) {
            return Err(Error::Channel(format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(message_id: MessageId) -> Error {
    Error::Channel(format!("message {} not found", message_id))
}

#[async_trait]
impl ChatTransport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send_text(&self, chat_id: ConversationId, text: &str) -> Result<MessageId> {
        self.begin(TransportOp::Send).await?;
        Ok(self.post_user_message(chat_id, text))
    }

    async fn edit_text(
        &self,
        chat_id: ConversationId,
        message_id: MessageId,
        text: &str,
    ) -> Result<()> {
        self.begin(TransportOp::Edit).await?;
        let mut state = self.lock();
        let message = state
            .chats
            .get_mut(&chat_id)
            .and_then(|chat| chat.messages.get_mut(&message_id))
            .ok_or_else(|| not_found(message_id))?;
        *message = text.to_string();
        Ok(())
    }

    async fn delete_message(&self, chat_id: ConversationId, message_id: MessageId) -> Result<()> {
        self.begin(TransportOp::Delete).await?;
        let mut state = self.lock();
        let chat = state
            .chats
            .get_mut(&chat_id)
            .ok_or_else(|| not_found(message_id))?;
        chat.messages
            .remove(&message_id)
            .ok_or_else(|| not_found(message_id))?;
        chat.pinned.retain(|id| *id != message_id);
        Ok(())
    }

    async fn pin_message(
        &self,
        chat_id: ConversationId,
        message_id: MessageId,
        _silent: bool,
    ) -> Result<()> {
        self.begin(TransportOp::Pin).await?;
        let mut state = self.lock();
        let chat = state
            .chats
            .get_mut(&chat_id)
            .filter(|chat| chat.messages.contains_key(&message_id))
            .ok_or_else(|| not_found(message_id))?;
        chat.pinned.retain(|id| *id != message_id);
        chat.pinned.push(message_id);
        Ok(())
    }

    async fn unpin_message(
        &self,
        chat_id: ConversationId,
        message_id: MessageId,
        _silent: bool,
    ) -> Result<()> {
        self.begin(TransportOp::Unpin).await?;
        let mut state = self.lock();
        let chat = state
            .chats
            .get_mut(&chat_id)
            .ok_or_else(|| not_found(message_id))?;
        let before = chat.pinned.len();
        chat.pinned.retain(|id| *id != message_id);
        if chat.pinned.len() == before {
            return Err(Error::Channel(format!("message {} is not pinned", message_id)));
        }
        Ok(())
    }

    async fn pinned_message_id(&self, chat_id: ConversationId) -> Result<Option<MessageId>> {
        self.begin(TransportOp::PinnedQuery).await?;
        Ok(self.pinned(chat_id))
    }
}
