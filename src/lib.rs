//! Pinlog - a Telegram note aggregator with a pinned running log
//!
//! Users post short notes prefixed with a marker (`.`). Each note is
//! timestamped, tagged with the longest matching category label, batched for
//! a couple of seconds and then folded into a single pinned summary message
//! per conversation. Consecutive notes of the same category collapse into one
//! line, so the pinned message reads as a compact journal of the day.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        Pinlog Gateway                         │
//! │  ┌─────────────────┐        ┌──────────────────────────────┐  │
//! │  │ TelegramAdapter │ events │   Command dispatch           │  │
//! │  │  (getUpdates)   ├───────►│   /start /help /process      │  │
//! │  └─────────────────┘        │   /clear  .-  .entry         │  │
//! │                             └──────────────┬───────────────┘  │
//! │  ┌─────────────────┐                       │                  │
//! │  │   HTTP API      ├───────────────────────┤                  │
//! │  │   (axum)        │                       │                  │
//! │  └─────────────────┘        ┌──────────────▼───────────────┐  │
//! │                             │     AggregationEngine        │  │
//! │                             │  parse → batch → merge       │  │
//! │                             │  reconcile → publish         │  │
//! │                             └──────┬───────────────┬───────┘  │
//! └────────────────────────────────────┼───────────────┼──────────┘
//!                                      │               │
//!                      ┌───────────────▼──┐   ┌────────▼─────────┐
//!                      │ ConversationStore│   │  ChatTransport   │
//!                      │ (per-chat locks) │   │ send/edit/pin/.. │
//!                      └──────────────────┘   └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`category`]: Category dictionary and longest-label classification
//! - [`conversation`]: Per-conversation state and the registry owning it
//! - [`aggregator`]: Entry parsing, merging and the flush protocol
//! - [`channels`]: Transport trait, Telegram adapter, in-memory transport
//! - [`gateway`]: Event loop, commands and HTTP API
//! - [`config`]: Configuration management

pub mod aggregator;
pub mod category;
pub mod channels;
pub mod config;
pub mod conversation;
pub mod error;
pub mod gateway;

pub use config::PinlogConfig;
pub use error::{Error, Result};
