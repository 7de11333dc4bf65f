//! Aggregation engine
//!
//! Owns the protocol between the in-memory conversation state and the one
//! pinned summary message per conversation. Every operation on a
//! conversation runs under that conversation's lock, and every transport
//! call is bounded by `call_timeout`; a failed or timed-out call is logged
//! and replaced by a fallback, never surfaced to the caller.

use super::intake::{EntryClock, EntryParser};
use super::merge::{merge_entries, render_summary};
use crate::category::CategoryMatcher;
use crate::channels::ChatTransport;
use crate::config::AggregatorConfig;
use crate::conversation::{
    ConversationId, ConversationState, ConversationStore, MessageId, PendingEntry,
};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;

/// An entry as delivered by the command layer
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub conversation_id: ConversationId,
    /// The user's message, deleted after the entry is merged
    pub message_id: MessageId,
    /// Raw text including the entry marker
    pub text: String,
    pub sent_at: Option<DateTime<Utc>>,
}

/// What a flush did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Pending was empty; nothing was touched
    NothingPending,
    /// `merged` pending entries were folded into a summary of `lines` lines
    Flushed { merged: usize, lines: usize },
}

/// Batches entries per conversation and keeps the pinned summary in sync
#[derive(Clone)]
pub struct AggregationEngine {
    config: AggregatorConfig,
    parser: Arc<EntryParser>,
    store: Arc<ConversationStore>,
    transport: Arc<dyn ChatTransport>,
}

impl AggregationEngine {
    /// Create an engine over the given store and transport
    pub fn new(
        config: AggregatorConfig,
        matcher: Arc<CategoryMatcher>,
        store: Arc<ConversationStore>,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self> {
        let clock = EntryClock::from_offset_minutes(config.utc_offset_minutes)?;
        let parser = Arc::new(EntryParser::new(config.entry_marker, clock, matcher)?);

        Ok(Self {
            config,
            parser,
            store,
            transport,
        })
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Record a new entry and make sure a flush is scheduled.
    ///
    /// Returns the pending entry, or `None` when the text is not an entry.
    /// Returns immediately; the flush runs `flush_delay` later on its own
    /// task. While a scheduled flush is outstanding, further entries just
    /// join the batch.
    pub async fn on_new_entry(&self, entry: NewEntry) -> Option<PendingEntry> {
        let parsed = self.parser.parse(&entry.text, entry.sent_at)?;
        let pending = PendingEntry::new(entry.message_id, parsed.text, parsed.timestamp);

        let handle = self.store.get_or_create(entry.conversation_id).await;
        let schedule = {
            let mut state = handle.lock().await;
            state.append_pending(pending.clone());
            state.try_schedule_flush()
        };

        tracing::debug!(
            chat_id = entry.conversation_id,
            message_id = entry.message_id,
            text = %pending.text,
            "Queued entry"
        );

        if schedule {
            self.schedule_flush(entry.conversation_id);
        }

        Some(pending)
    }

    fn schedule_flush(&self, chat_id: ConversationId) {
        let engine = self.clone();
        let delay = self.config.flush_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let handle = engine.store.get_or_create(chat_id).await;
            let mut state = handle.lock().await;
            state.take_scheduled_flush();
            engine.flush_locked(chat_id, &mut state).await;
        });
    }

    /// Flush now, regardless of any scheduled flush
    pub async fn on_manual_flush(&self, chat_id: ConversationId) -> FlushOutcome {
        let handle = self.store.get_or_create(chat_id).await;
        let mut state = handle.lock().await;
        self.flush_locked(chat_id, &mut state).await
    }

    /// Drop the most recent summary line. Returns whether a line was removed.
    pub async fn on_remove_last(&self, chat_id: ConversationId) -> bool {
        let handle = self.store.get_or_create(chat_id).await;
        let mut state = handle.lock().await;

        let mut committed = state.committed().to_vec();
        if committed.pop().is_none() {
            return false;
        }
        state.replace_committed(committed);
        self.publish(chat_id, &mut state).await;

        tracing::info!(
            chat_id,
            lines = state.committed().len(),
            "Removed last summary line"
        );
        true
    }

    /// Forget everything about a conversation and take down its summary.
    /// Returns whether there was anything to clear.
    pub async fn on_reset(&self, chat_id: ConversationId) -> bool {
        let handle = self.store.get_or_create(chat_id).await;
        let mut state = handle.lock().await;

        let cleared = !state.is_empty();
        self.retire_summary(chat_id, &mut state).await;
        state.clear_all();

        tracing::info!(chat_id, cleared, "Reset conversation");
        cleared
    }

    /// Someone unpinned `message_id`. If it is our summary, start a new log.
    pub async fn on_external_unpin(&self, chat_id: ConversationId, message_id: MessageId) -> bool {
        let Some(handle) = self.store.get(chat_id).await else {
            return false;
        };
        let mut state = handle.lock().await;

        if state.summary_id() != Some(message_id) {
            return false;
        }
        state.clear_committed();
        state.clear_summary_id();

        tracing::info!(chat_id, message_id, "Summary unpinned externally, log cleared");
        true
    }

    async fn flush_locked(&self, chat_id: ConversationId, state: &mut ConversationState) -> FlushOutcome {
        if state.pending().is_empty() {
            return FlushOutcome::NothingPending;
        }

        self.reconcile(chat_id, state).await;

        let merged = merge_entries(state.committed(), state.pending());
        state.replace_committed(merged);
        self.publish(chat_id, state).await;

        let sources: Vec<MessageId> = state.pending().iter().map(|e| e.message_id).collect();
        futures::future::join_all(
            sources
                .iter()
                .map(|&message_id| self.delete(chat_id, message_id)),
        )
        .await;

        let merged = sources.len();
        state.clear_pending();

        let lines = state.committed().len();
        tracing::info!(chat_id, merged, lines, "Flushed entries into summary");
        FlushOutcome::Flushed { merged, lines }
    }

    /// Drop local summary state if the platform no longer shows our message
    /// as the pinned one. An unanswered query leaves the state alone.
    async fn reconcile(&self, chat_id: ConversationId, state: &mut ConversationState) {
        let Some(recorded) = state.summary_id() else {
            return;
        };

        match self
            .call("pinned_message_id", chat_id, self.transport.pinned_message_id(chat_id))
            .await
        {
            Some(Some(pinned)) if pinned == recorded => {}
            Some(pinned) => {
                tracing::warn!(
                    chat_id,
                    recorded,
                    pinned = ?pinned,
                    "Summary is no longer pinned, starting a new log"
                );
                state.clear_committed();
                state.clear_summary_id();
            }
            None => {
                tracing::debug!(chat_id, recorded, "Could not confirm pinned summary");
            }
        }
    }

    /// Make the pinned summary match the committed lines
    async fn publish(&self, chat_id: ConversationId, state: &mut ConversationState) {
        if state.committed().is_empty() {
            self.retire_summary(chat_id, state).await;
            return;
        }

        let body = render_summary(state.committed());

        if let Some(summary_id) = state.summary_id() {
            let edited = self
                .call(
                    "edit_text",
                    chat_id,
                    self.transport.edit_text(chat_id, summary_id, &body),
                )
                .await;
            if edited.is_some() {
                return;
            }
            tracing::info!(chat_id, summary_id, "Summary edit failed, posting a new one");
            state.clear_summary_id();
        }

        if let Some(summary_id) = self.post_pinned(chat_id, &body).await {
            state.set_summary_id(Some(summary_id));
        }
    }

    /// Send and silently pin a new summary message
    async fn post_pinned(&self, chat_id: ConversationId, body: &str) -> Option<MessageId> {
        let summary_id = self
            .call("send_text", chat_id, self.transport.send_text(chat_id, body))
            .await?;

        let pinned = self
            .call(
                "pin_message",
                chat_id,
                self.transport.pin_message(chat_id, summary_id, true),
            )
            .await;
        if pinned.is_none() {
            // The message stays in the chat, but an unpinned summary would
            // fail reconciliation and wipe the log on the next flush, so the
            // id is not recorded and the next flush posts a fresh one.
            tracing::warn!(chat_id, summary_id, "Summary posted but not pinned");
            return None;
        }

        tracing::debug!(chat_id, summary_id, "Posted new pinned summary");
        Some(summary_id)
    }

    /// Unpin and delete the summary message, if any, and forget its id
    async fn retire_summary(&self, chat_id: ConversationId, state: &mut ConversationState) {
        let Some(summary_id) = state.summary_id() else {
            return;
        };

        self.call(
            "unpin_message",
            chat_id,
            self.transport.unpin_message(chat_id, summary_id, true),
        )
        .await;
        self.delete(chat_id, summary_id).await;
        state.clear_summary_id();
    }

    async fn delete(&self, chat_id: ConversationId, message_id: MessageId) -> bool {
        self.call(
            "delete_message",
            chat_id,
            self.transport.delete_message(chat_id, message_id),
        )
        .await
        .is_some()
    }

    /// Run a transport call under the call timeout; failures become `None`
    async fn call<T>(
        &self,
        op: &'static str,
        chat_id: ConversationId,
        fut: impl Future<Output = Result<T>>,
    ) -> Option<T> {
        let timeout = self.config.call_timeout();
        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!(
                    chat_id,
                    op,
                    transport = self.transport.name(),
                    error = %e,
                    "Transport call failed"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    chat_id,
                    op,
                    transport = self.transport.name(),
                    timeout = ?timeout,
                    "Transport call timed out"
                );
                None
            }
        }
    }
}
