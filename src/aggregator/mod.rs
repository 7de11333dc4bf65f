//! Entry aggregation
//!
//! Turns marked messages into timestamped, categorized entries, batches
//! them per conversation and folds each batch into the pinned summary.

mod engine;
mod intake;
mod merge;

pub use engine::{AggregationEngine, FlushOutcome, NewEntry};
pub use intake::{EntryClock, EntryParser, EntryTime, ParsedEntry};
pub use merge::{merge_entries, render_summary};
