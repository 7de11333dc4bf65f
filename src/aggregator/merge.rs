//! Merging pending entries into the summary

use crate::category::same_label;
use crate::conversation::{CommittedEntry, PendingEntry};

/// Fold `pending` into `committed`, in order.
///
/// An entry whose category equals the category of the current last line
/// replaces that line; anything else is appended. Consecutive lines therefore
/// never share a category.
pub fn merge_entries(committed: &[CommittedEntry], pending: &[PendingEntry]) -> Vec<CommittedEntry> {
    let mut merged = committed.to_vec();
    for entry in pending {
        let entry = CommittedEntry::from(entry.clone());
        match merged.last_mut() {
            Some(last) if same_label(&last.text, &entry.text) => *last = entry,
            _ => merged.push(entry),
        }
    }
    merged
}

/// Summary message body: one `"<timestamp> <text>"` line per entry
pub fn render_summary(committed: &[CommittedEntry]) -> String {
    committed
        .iter()
        .map(CommittedEntry::line)
        .collect::<Vec<_>>()
        .join("\n")
}
