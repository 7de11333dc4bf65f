//! Telegram channel adapter
//!
//! Talks to the Bot API over HTTPS: long-polls `getUpdates` for inbound
//! events and implements [`ChatTransport`] for the aggregation engine.

use super::adapter::{AdapterBase, AdapterStatus, ChannelAdapter};
use super::message::{ChannelEvent, InboundMessage};
use super::transport::ChatTransport;
use crate::config::TelegramConfig;
use crate::conversation::{ConversationId, MessageId};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

const CHANNEL_NAME: &str = "telegram";

/// Back-off after a failed poll
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bot API client
#[derive(Clone)]
struct TelegramApi {
    client: Client,
    base_url: String,
    request_timeout: Duration,
    polling_timeout: u64,
}

impl TelegramApi {
    fn new(config: &TelegramConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: format!(
                "{}/bot{}",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            polling_timeout: config.polling_timeout_secs,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(&params)
            .timeout(timeout)
            .send()
            .await?;

        // Error replies carry a JSON body with `ok: false`, whatever the status
        let body: TelegramResponse<T> = response.json().await?;
        if body.ok {
            body.result
                .ok_or_else(|| Error::Telegram(format!("{} returned ok but no result", method)))
        } else {
            Err(Error::Telegram(body.description.unwrap_or_else(|| {
                format!("{} failed with code {}", method, body.error_code.unwrap_or(0))
            })))
        }
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T> {
        self.call(method, params, self.request_timeout).await
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>> {
        let params = serde_json::json!({
            "offset": offset,
            "timeout": self.polling_timeout,
            "allowed_updates": ["message"],
        });
        let timeout = Duration::from_secs(self.polling_timeout + 10);
        self.call("getUpdates", params, timeout).await
    }
}

/// Telegram channel adapter
pub struct TelegramAdapter {
    api: TelegramApi,
    base: Arc<AdapterBase>,
    last_update_id: Arc<AtomicI64>,
    poller: Mutex<Option<JoinHandle<()>>>,
    username: OnceLock<String>,
}

impl TelegramAdapter {
    /// Create a new Telegram adapter
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            api: TelegramApi::new(&config),
            base: Arc::new(AdapterBase::new(CHANNEL_NAME)),
            last_update_id: Arc::new(AtomicI64::new(0)),
            poller: Mutex::new(None),
            username: OnceLock::new(),
        }
    }

    /// Last processed update id
    pub fn last_update_id(&self) -> i64 {
        self.last_update_id.load(Ordering::SeqCst)
    }

    async fn poll_loop(
        api: TelegramApi,
        base: Arc<AdapterBase>,
        last_update_id: Arc<AtomicI64>,
        event_tx: mpsc::Sender<ChannelEvent>,
    ) {
        tracing::info!("Starting Telegram polling");

        while base.is_running() {
            let last = last_update_id.load(Ordering::SeqCst);
            let offset = if last > 0 { last + 1 } else { 0 };

            match api.get_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        last_update_id.store(update.update_id, Ordering::SeqCst);
                        let Some(event) = convert_update(update) else {
                            continue;
                        };
                        if event_tx.send(event).await.is_err() {
                            tracing::warn!("Event receiver dropped, stopping Telegram polling");
                            base.set_status(AdapterStatus::Stopped);
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Telegram polling error: {}", e);
                    let _ = event_tx
                        .send(ChannelEvent::Error {
                            channel: CHANNEL_NAME.to_string(),
                            error: e.to_string(),
                        })
                        .await;
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }

        tracing::info!("Telegram polling stopped");
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn start(&self, event_tx: mpsc::Sender<ChannelEvent>) -> Result<()> {
        self.base.set_status(AdapterStatus::Starting);

        let me: TelegramUser = match self.api.request("getMe", serde_json::json!({})).await {
            Ok(me) => me,
            Err(e) => {
                self.base.set_status(AdapterStatus::Failed);
                return Err(Error::Channel(format!("Telegram getMe failed: {}", e)));
            }
        };
        tracing::info!(
            bot = me.username.as_deref().unwrap_or("unknown"),
            "Telegram adapter starting"
        );
        if let Some(username) = me.username {
            let _ = self.username.set(username);
        }

        self.base.set_status(AdapterStatus::Running);

        let _ = event_tx
            .send(ChannelEvent::Connected {
                channel: CHANNEL_NAME.to_string(),
            })
            .await;

        let handle = tokio::spawn(Self::poll_loop(
            self.api.clone(),
            self.base.clone(),
            self.last_update_id.clone(),
            event_tx,
        ));
        *self.poller.lock().await = Some(handle);

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.base.set_status(AdapterStatus::Stopping);

        // The poller may be parked in a long poll; don't wait it out.
        if let Some(handle) = self.poller.lock().await.take() {
            handle.abort();
        }

        self.base.set_status(AdapterStatus::Stopped);
        tracing::info!("Telegram adapter stopped");

        Ok(())
    }

    fn status(&self) -> AdapterStatus {
        self.base.status()
    }

    fn bot_username(&self) -> Option<String> {
        self.username.get().cloned()
    }
}

#[async_trait]
impl ChatTransport for TelegramAdapter {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn send_text(&self, chat_id: ConversationId, text: &str) -> Result<MessageId> {
        let message: TelegramMessage = self
            .api
            .request(
                "sendMessage",
                serde_json::json!({ "chat_id": chat_id, "text": text }),
            )
            .await?;
        Ok(message.message_id)
    }

    async fn edit_text(
        &self,
        chat_id: ConversationId,
        message_id: MessageId,
        text: &str,
    ) -> Result<()> {
        let result: Result<serde_json::Value> = self
            .api
            .request(
                "editMessageText",
                serde_json::json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "text": text,
                }),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            // Same text as before; the message is already what we want.
            Err(Error::Telegram(description)) if is_not_modified(&description) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn delete_message(&self, chat_id: ConversationId, message_id: MessageId) -> Result<()> {
        let _: bool = self
            .api
            .request(
                "deleteMessage",
                serde_json::json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    async fn pin_message(
        &self,
        chat_id: ConversationId,
        message_id: MessageId,
        silent: bool,
    ) -> Result<()> {
        let _: bool = self
            .api
            .request(
                "pinChatMessage",
                serde_json::json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "disable_notification": silent,
                }),
            )
            .await?;
        Ok(())
    }

    async fn unpin_message(
        &self,
        chat_id: ConversationId,
        message_id: MessageId,
        _silent: bool,
    ) -> Result<()> {
        // unpinChatMessage never notifies members
        let _: bool = self
            .api
            .request(
                "unpinChatMessage",
                serde_json::json!({ "chat_id": chat_id, "message_id": message_id }),
            )
            .await?;
        Ok(())
    }

    async fn pinned_message_id(&self, chat_id: ConversationId) -> Result<Option<MessageId>> {
        let chat: TelegramChat = self
            .api
            .request("getChat", serde_json::json!({ "chat_id": chat_id }))
            .await?;
        Ok(chat.pinned_message.map(|m| m.message_id))
    }
}

fn is_not_modified(description: &str) -> bool {
    description.contains("message is not modified")
}

/// Convert a Telegram update into a channel event
fn convert_update(update: TelegramUpdate) -> Option<ChannelEvent> {
    let message = update.message?;
    let from_bot = message.from.as_ref().map(|u| u.is_bot).unwrap_or(false);

    if let Some(pinned) = message.pinned_message {
        return Some(ChannelEvent::Pinned {
            chat_id: message.chat.id,
            message_id: pinned.message_id,
            notice_id: message.message_id,
            from_bot,
        });
    }

    let text = message.text?;
    let mut inbound =
        InboundMessage::new(message.chat.id, message.message_id, text).from_bot(from_bot);
    if let Some(sent_at) = chrono::DateTime::from_timestamp(message.date, 0) {
        inbound = inbound.sent_at(sent_at);
    }
    Some(ChannelEvent::Message(inbound))
}

// ============================================================================
// Telegram API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    from: Option<TelegramUser>,
    chat: TelegramChatRef,
    #[serde(default)]
    date: i64,
    text: Option<String>,
    pinned_message: Option<Box<TelegramMessage>>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    is_bot: bool,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChatRef {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    pinned_message: Option<Box<TelegramMessage>>,
}
