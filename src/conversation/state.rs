//! Per-conversation aggregation state

use crate::aggregator::EntryTime;
use serde::Serialize;

/// Conversation identifier (Telegram chat id)
pub type ConversationId = i64;

/// Message identifier within a conversation
pub type MessageId = i64;

/// An entry waiting for the next flush
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingEntry {
    /// The user's original message, deleted once the entry is merged
    pub message_id: MessageId,
    /// Display text after category wrapping
    pub text: String,
    pub timestamp: EntryTime,
}

impl PendingEntry {
    pub fn new(message_id: MessageId, text: impl Into<String>, timestamp: EntryTime) -> Self {
        Self {
            message_id,
            text: text.into(),
            timestamp,
        }
    }
}

/// One line of the pinned summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedEntry {
    pub text: String,
    pub timestamp: EntryTime,
}

impl CommittedEntry {
    pub fn new(text: impl Into<String>, timestamp: EntryTime) -> Self {
        Self {
            text: text.into(),
            timestamp,
        }
    }

    /// Summary line: `"<timestamp> <text>"`
    pub fn line(&self) -> String {
        format!("{} {}", self.timestamp, self.text)
    }
}

impl From<PendingEntry> for CommittedEntry {
    fn from(entry: PendingEntry) -> Self {
        Self {
            text: entry.text,
            timestamp: entry.timestamp,
        }
    }
}

/// Aggregation phase, derived from the state contents.
///
/// A flush always runs while holding the conversation lock, so no other
/// operation can observe a conversation mid-flush; the flushing phase is
/// therefore never reported from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    /// Nothing pending; the summary (if any) is in sync
    Idle,
    /// Entries are waiting for a flush
    Collecting,
    /// Committed lines exist but no summary message is recorded
    SummaryAbsent,
}

/// Mutable record owned by the conversation store
#[derive(Debug, Default)]
pub struct ConversationState {
    pending: Vec<PendingEntry>,
    committed: Vec<CommittedEntry>,
    summary_id: Option<MessageId>,
    flush_scheduled: bool,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &[PendingEntry] {
        &self.pending
    }

    pub fn committed(&self) -> &[CommittedEntry] {
        &self.committed
    }

    /// Id of the pinned summary message we believe is current
    pub fn summary_id(&self) -> Option<MessageId> {
        self.summary_id
    }

    pub fn append_pending(&mut self, entry: PendingEntry) {
        self.pending.push(entry);
    }

    pub fn replace_committed(&mut self, committed: Vec<CommittedEntry>) {
        self.committed = committed;
    }

    pub fn set_summary_id(&mut self, id: Option<MessageId>) {
        self.summary_id = id;
    }

    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    pub fn clear_committed(&mut self) {
        self.committed.clear();
    }

    pub fn clear_summary_id(&mut self) {
        self.summary_id = None;
    }

    /// Whether there is anything at all to clear
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.committed.is_empty() && self.summary_id.is_none()
    }

    /// Clear everything. Returns whether anything was present.
    pub fn clear_all(&mut self) -> bool {
        let had_data = !self.is_empty();
        self.clear_pending();
        self.clear_committed();
        self.clear_summary_id();
        had_data
    }

    /// Mark a delayed flush as outstanding. Returns `false` if one already is.
    pub fn try_schedule_flush(&mut self) -> bool {
        !std::mem::replace(&mut self.flush_scheduled, true)
    }

    /// Called by the delayed flush when it fires
    pub fn take_scheduled_flush(&mut self) -> bool {
        std::mem::take(&mut self.flush_scheduled)
    }

    pub fn flush_scheduled(&self) -> bool {
        self.flush_scheduled
    }

    pub fn phase(&self) -> ConversationPhase {
        if !self.pending.is_empty() {
            ConversationPhase::Collecting
        } else if !self.committed.is_empty() && self.summary_id.is_none() {
            ConversationPhase::SummaryAbsent
        } else {
            ConversationPhase::Idle
        }
    }
}
