//! Channel adapter lifecycle

use super::message::ChannelEvent;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;

/// Adapter lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AdapterStatus {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Failed = 4,
}

impl AdapterStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Failed,
            _ => Self::Stopped,
        }
    }
}

/// Shared bookkeeping for adapters
#[derive(Debug)]
pub struct AdapterBase {
    name: &'static str,
    status: AtomicU8,
}

impl AdapterBase {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            status: AtomicU8::new(AdapterStatus::Stopped as u8),
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn status(&self) -> AdapterStatus {
        AdapterStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn set_status(&self, status: AdapterStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.status() == AdapterStatus::Running
    }
}

/// Inbound side of a messaging platform
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Channel name
    fn name(&self) -> &str;

    /// Start delivering events
    async fn start(&self, event_tx: mpsc::Sender<ChannelEvent>) -> Result<()>;

    /// Stop delivering events
    async fn stop(&self) -> Result<()>;

    fn status(&self) -> AdapterStatus;

    /// The bot's own username, once known. Commands addressed to another
    /// bot (`/clear@other_bot`) are ignored.
    fn bot_username(&self) -> Option<String> {
        None
    }

    fn is_connected(&self) -> bool {
        self.status() == AdapterStatus::Running
    }
}
