//! Messaging platform adapters
//!
//! [`ChannelAdapter`] delivers inbound events, [`ChatTransport`] performs
//! the outbound operations the aggregation engine relies on.

mod adapter;
mod memory;
mod message;
mod telegram;
mod transport;

pub use adapter::{AdapterBase, AdapterStatus, ChannelAdapter};
pub use memory::{MemoryTransport, TransportOp};
pub use message::{ChannelEvent, InboundMessage};
pub use telegram::TelegramAdapter;
pub use transport::ChatTransport;
