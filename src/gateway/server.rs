//! Gateway server implementation

use super::command::{Command, CLEARED_REPLY, HELP_REPLY, NOTHING_TO_CLEAR_REPLY, START_REPLY};
use crate::aggregator::{AggregationEngine, FlushOutcome, NewEntry};
use crate::category::CategoryMatcher;
use crate::channels::{
    AdapterStatus, ChannelAdapter, ChannelEvent, ChatTransport, InboundMessage, TelegramAdapter,
};
use crate::config::PinlogConfig;
use crate::conversation::{ConversationId, ConversationStore, MessageId};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Gateway server state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    /// Not started
    Stopped,
    /// Starting up
    Starting,
    /// Running
    Running,
    /// Shutting down
    ShuttingDown,
}

/// Routes channel events to the aggregation engine
#[derive(Clone)]
struct EventDispatcher {
    engine: AggregationEngine,
    transport: Arc<dyn ChatTransport>,
    adapter: Option<Arc<dyn ChannelAdapter>>,
    marker: char,
    remove_last: String,
    call_timeout: Duration,
}

impl EventDispatcher {
    async fn dispatch(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(message) => self.handle_message(message).await,
            ChannelEvent::Pinned {
                chat_id,
                message_id,
                notice_id,
                from_bot,
            } => {
                if from_bot {
                    tracing::debug!(chat_id, message_id, notice_id, "Deleting pin notice");
                    self.bounded(
                        "delete_message",
                        chat_id,
                        self.transport.delete_message(chat_id, notice_id),
                    )
                    .await;
                }
            }
            ChannelEvent::Unpinned {
                chat_id,
                message_id,
            } => {
                self.engine.on_external_unpin(chat_id, message_id).await;
            }
            ChannelEvent::Connected { channel } => {
                tracing::info!("Channel {} connected", channel);
            }
            ChannelEvent::Disconnected { channel, reason } => {
                tracing::warn!("Channel {} disconnected: {}", channel, reason);
            }
            ChannelEvent::Error { channel, error } => {
                tracing::error!("Channel {} error: {}", channel, error);
            }
        }
    }

    async fn handle_message(&self, message: InboundMessage) {
        if message.from_bot {
            return;
        }

        let username = self.adapter.as_ref().and_then(|a| a.bot_username());
        let Some(command) = Command::parse(
            &message.text,
            self.marker,
            &self.remove_last,
            username.as_deref(),
        ) else {
            return;
        };

        let chat_id = message.chat_id;
        tracing::debug!(chat_id, message_id = message.message_id, ?command, "Received command");

        match command {
            Command::Start => self.reply(chat_id, START_REPLY).await,
            Command::Help => self.reply(chat_id, HELP_REPLY).await,
            Command::Process => {
                if self.engine.on_manual_flush(chat_id).await == FlushOutcome::NothingPending {
                    tracing::debug!(chat_id, "Manual flush with nothing pending");
                }
            }
            Command::Clear => {
                let cleared = self.engine.on_reset(chat_id).await;
                let text = if cleared {
                    CLEARED_REPLY
                } else {
                    NOTHING_TO_CLEAR_REPLY
                };
                self.reply(chat_id, text).await;
            }
            Command::RemoveLast => {
                self.engine.on_remove_last(chat_id).await;
                self.delete(chat_id, message.message_id).await;
            }
            Command::Entry => {
                self.engine
                    .on_new_entry(NewEntry {
                        conversation_id: chat_id,
                        message_id: message.message_id,
                        text: message.text,
                        sent_at: message.sent_at,
                    })
                    .await;
            }
        }
    }

    async fn reply(&self, chat_id: ConversationId, text: &str) {
        self.bounded("send_text", chat_id, self.transport.send_text(chat_id, text))
            .await;
    }

    async fn delete(&self, chat_id: ConversationId, message_id: MessageId) {
        self.bounded(
            "delete_message",
            chat_id,
            self.transport.delete_message(chat_id, message_id),
        )
        .await;
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        chat_id: ConversationId,
        fut: impl Future<Output = Result<T>>,
    ) -> Option<T> {
        let result = match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.call_timeout)),
        };
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(chat_id, op, error = %e, "Gateway transport call failed");
                None
            }
        }
    }
}

/// Pinlog Gateway server
pub struct Gateway {
    config: PinlogConfig,
    state: Arc<RwLock<GatewayState>>,
    store: Arc<ConversationStore>,
    dispatcher: EventDispatcher,
    adapter: Option<Arc<dyn ChannelAdapter>>,
    event_tx: mpsc::Sender<ChannelEvent>,
    event_rx: Arc<RwLock<Option<mpsc::Receiver<ChannelEvent>>>>,
}

impl Gateway {
    fn new(
        config: PinlogConfig,
        transport: Arc<dyn ChatTransport>,
        adapter: Option<Arc<dyn ChannelAdapter>>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(1000);

        let matcher = Arc::new(CategoryMatcher::new(&config.categories.labels));
        let store = Arc::new(ConversationStore::new());
        let engine = AggregationEngine::new(
            config.aggregator.clone(),
            matcher,
            store.clone(),
            transport.clone(),
        )?;

        let dispatcher = EventDispatcher {
            engine,
            transport,
            adapter: adapter.clone(),
            marker: config.aggregator.entry_marker,
            remove_last: config.aggregator.remove_last_command.clone(),
            call_timeout: config.aggregator.call_timeout(),
        };

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(GatewayState::Stopped)),
            store,
            dispatcher,
            adapter,
            event_tx,
            event_rx: Arc::new(RwLock::new(Some(event_rx))),
        })
    }

    /// Get current state
    pub async fn state(&self) -> GatewayState {
        *self.state.read().await
    }

    /// Start the gateway
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != GatewayState::Stopped {
            return Err(Error::Internal("Gateway already running".to_string()));
        }
        *state = GatewayState::Starting;
        drop(state);

        tracing::info!("Starting Pinlog Gateway");

        self.start_event_processor().await;

        if let Some(adapter) = &self.adapter {
            if let Err(e) = adapter.start(self.event_tx.clone()).await {
                *self.state.write().await = GatewayState::Stopped;
                return Err(e);
            }
        }

        *self.state.write().await = GatewayState::Running;

        tracing::info!(
            transport = self.dispatcher.transport.name(),
            "Pinlog Gateway started"
        );

        Ok(())
    }

    /// Stop the gateway
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state != GatewayState::Running {
            return Ok(());
        }
        *state = GatewayState::ShuttingDown;
        drop(state);

        tracing::info!("Stopping Pinlog Gateway");

        if let Some(adapter) = &self.adapter {
            if let Err(e) = adapter.stop().await {
                tracing::warn!("Failed to stop channel {}: {}", adapter.name(), e);
            }
        }

        *self.state.write().await = GatewayState::Stopped;

        tracing::info!("Pinlog Gateway stopped");

        Ok(())
    }

    /// Start the event processor.
    ///
    /// Each busy conversation gets its own lane so events within a
    /// conversation are handled in arrival order while a slow conversation
    /// never holds up the others. A lane exits once drained; finished lanes
    /// are pruned whenever a new one is opened.
    async fn start_event_processor(&self) {
        let event_rx = self.event_rx.write().await.take();
        let Some(mut rx) = event_rx else {
            return;
        };
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(async move {
            let mut lanes: HashMap<ConversationId, Lane> = HashMap::new();

            while let Some(event) = rx.recv().await {
                let Some(chat_id) = event.chat_id() else {
                    dispatcher.dispatch(event).await;
                    continue;
                };

                let event = match lanes.get(&chat_id) {
                    Some(lane) => match lane.tx.send(event) {
                        Ok(()) => continue,
                        Err(mpsc::error::SendError(event)) => event,
                    },
                    None => event,
                };

                // A closed lane may still be draining; the new one waits for it
                let previous = lanes.remove(&chat_id).map(|lane| lane.task);
                lanes.retain(|_, lane| !lane.task.is_finished());
                lanes.insert(chat_id, spawn_lane(dispatcher.clone(), event, previous));
            }

            tracing::debug!("Event processor stopped");
        });
    }

    /// Handle one event to completion
    pub async fn dispatch(&self, event: ChannelEvent) {
        self.dispatcher.dispatch(event).await;
    }

    /// Get configuration
    pub fn config(&self) -> &PinlogConfig {
        &self.config
    }

    /// Get the aggregation engine
    pub fn engine(&self) -> &AggregationEngine {
        &self.dispatcher.engine
    }

    /// Get the conversation store
    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Get event sender for injecting external events
    pub fn event_sender(&self) -> &mpsc::Sender<ChannelEvent> {
        &self.event_tx
    }

    /// Status of the inbound channel.
    ///
    /// Without an adapter, events only arrive through [`dispatch`](Self::dispatch)
    /// and the event sender, so the gateway's own state stands in.
    pub async fn bot_status(&self) -> AdapterStatus {
        match &self.adapter {
            Some(adapter) => adapter.status(),
            None => match self.state().await {
                GatewayState::Running => AdapterStatus::Running,
                GatewayState::Starting => AdapterStatus::Starting,
                GatewayState::ShuttingDown => AdapterStatus::Stopping,
                GatewayState::Stopped => AdapterStatus::Stopped,
            },
        }
    }

    /// Get gateway status information
    pub async fn status(&self) -> GatewayStatus {
        let state = self.state().await;
        let bot_status = self.bot_status().await;

        GatewayStatus {
            state: format!("{:?}", state),
            bot_status,
            bot_running: bot_status == AdapterStatus::Running,
            transport: self.dispatcher.transport.name().to_string(),
            conversation_count: self.store.len().await,
        }
    }
}

/// Sequential event queue for one conversation
struct Lane {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    task: JoinHandle<()>,
}

/// Handle `first` and whatever queues up behind it, then close.
fn spawn_lane(
    dispatcher: EventDispatcher,
    first: ChannelEvent,
    previous: Option<JoinHandle<()>>,
) -> Lane {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(async move {
        if let Some(previous) = previous {
            let _ = previous.await;
        }
        dispatcher.dispatch(first).await;

        while let Ok(event) = rx.try_recv() {
            dispatcher.dispatch(event).await;
        }
        // Events sent before the close are still buffered
        rx.close();
        while let Ok(event) = rx.try_recv() {
            dispatcher.dispatch(event).await;
        }
    });
    Lane { tx, task }
}

/// Gateway status information
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    /// Current state
    pub state: String,
    /// Inbound channel status
    pub bot_status: AdapterStatus,
    pub bot_running: bool,
    /// Outbound transport name
    pub transport: String,
    /// Number of known conversations
    pub conversation_count: usize,
}

/// Builder for Gateway
pub struct GatewayBuilder {
    config: PinlogConfig,
    transport: Option<Arc<dyn ChatTransport>>,
    adapter: Option<Arc<dyn ChannelAdapter>>,
}

impl GatewayBuilder {
    /// Create a new builder with default config
    pub fn new() -> Self {
        Self {
            config: PinlogConfig::default(),
            transport: None,
            adapter: None,
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: PinlogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the gateway host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.gateway.host = host.into();
        self
    }

    /// Set the gateway port
    pub fn port(mut self, port: u16) -> Self {
        self.config.gateway.port = port;
        self
    }

    /// Use `transport` instead of Telegram. Unless an adapter is set too,
    /// events are fed through [`Gateway::dispatch`] or the event sender.
    pub fn transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Inbound adapter to pair with a custom transport
    pub fn adapter(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Build the gateway
    pub fn build(self) -> Result<Gateway> {
        if let Some(transport) = self.transport {
            return Gateway::new(self.config, transport, self.adapter);
        }

        if !self.config.telegram.is_configured() {
            return Err(Error::Config(
                "telegram.bot_token is not set (set it in the config file or BOT_TOKEN)"
                    .to_string(),
            ));
        }

        let telegram = Arc::new(TelegramAdapter::new(self.config.telegram.clone()));
        let transport: Arc<dyn ChatTransport> = telegram.clone();
        let adapter: Arc<dyn ChannelAdapter> = telegram;
        Gateway::new(self.config, transport, Some(adapter))
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{MemoryTransport, TransportOp};

    const CHAT: ConversationId = 7;

    fn memory_gateway() -> (Gateway, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        let gateway = GatewayBuilder::new()
            .transport(transport.clone())
            .build()
            .unwrap();
        (gateway, transport)
    }

    async fn say(gateway: &Gateway, transport: &MemoryTransport, text: &str) -> MessageId {
        let message_id = transport.post_user_message(CHAT, text);
        gateway
            .dispatch(ChannelEvent::Message(InboundMessage::new(
                CHAT, message_id, text,
            )))
            .await;
        message_id
    }

    #[tokio::test]
    async fn test_gateway_creation() {
        let transport = Arc::new(MemoryTransport::new());
        let gateway = GatewayBuilder::new()
            .host("0.0.0.0")
            .port(18790)
            .transport(transport)
            .build()
            .unwrap();

        assert_eq!(gateway.state().await, GatewayState::Stopped);
        assert_eq!(gateway.config().gateway.port, 18790);
        assert_eq!(gateway.config().gateway.host, "0.0.0.0");
    }

    #[test]
    fn test_build_without_token_fails() {
        let result = GatewayBuilder::new().build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_build_with_token_uses_telegram() {
        let mut config = PinlogConfig::default();
        config.telegram.bot_token = "123:abc".to_string();
        assert!(GatewayBuilder::new().config(config).build().is_ok());
    }

    #[tokio::test]
    async fn test_gateway_lifecycle() {
        let (gateway, _) = memory_gateway();
        assert_eq!(gateway.bot_status().await, AdapterStatus::Stopped);

        gateway.start().await.unwrap();
        assert_eq!(gateway.state().await, GatewayState::Running);
        assert!(gateway.status().await.bot_running);
        assert!(gateway.start().await.is_err());

        gateway.stop().await.unwrap();
        assert_eq!(gateway.state().await, GatewayState::Stopped);
    }

    #[tokio::test]
    async fn test_start_and_help_replies() {
        let (gateway, transport) = memory_gateway();
        say(&gateway, &transport, "/start").await;
        say(&gateway, &transport, "/help@pinlog_bot").await;

        let texts = transport.texts(CHAT);
        assert!(texts.contains(&START_REPLY.to_string()));
        assert!(texts.contains(&HELP_REPLY.to_string()));
    }

    #[tokio::test]
    async fn test_entry_then_process() {
        let (gateway, transport) = memory_gateway();
        let source = say(&gateway, &transport, ".07.30 бег 5км").await;
        say(&gateway, &transport, "/process").await;

        assert_eq!(
            transport.pinned_text(CHAT).as_deref(),
            Some("07.30 =бег= (5км)")
        );
        assert_eq!(transport.message(CHAT, source), None);
    }

    #[tokio::test]
    async fn test_clear_replies() {
        let (gateway, transport) = memory_gateway();
        say(&gateway, &transport, "/clear").await;
        assert!(transport.texts(CHAT).contains(&NOTHING_TO_CLEAR_REPLY.to_string()));

        say(&gateway, &transport, ".бег").await;
        say(&gateway, &transport, "/clear").await;
        assert!(transport.texts(CHAT).contains(&CLEARED_REPLY.to_string()));
        assert!(gateway.store().snapshot(CHAT).await.unwrap().pending.is_empty());
    }

    #[tokio::test]
    async fn test_remove_last_deletes_command() {
        let (gateway, transport) = memory_gateway();
        say(&gateway, &transport, ".07.00 бег").await;
        say(&gateway, &transport, ".07.10 гитара").await;
        say(&gateway, &transport, "/process").await;

        let command = say(&gateway, &transport, ".-").await;

        assert_eq!(transport.message(CHAT, command), None);
        assert_eq!(transport.pinned_text(CHAT).as_deref(), Some("07.00 =бег="));
    }

    #[tokio::test]
    async fn test_plain_text_and_bot_messages_ignored() {
        let (gateway, transport) = memory_gateway();
        say(&gateway, &transport, "hello there").await;

        let id = transport.post_user_message(CHAT, ".бег");
        gateway
            .dispatch(ChannelEvent::Message(
                InboundMessage::new(CHAT, id, ".бег").from_bot(true),
            ))
            .await;

        assert!(gateway.store().get(CHAT).await.is_none());
        assert_eq!(transport.calls(TransportOp::Send), 0);
    }

    #[tokio::test]
    async fn test_bot_pin_notice_deleted() {
        let (gateway, transport) = memory_gateway();
        let ours = transport.post_user_message(CHAT, "");
        let theirs = transport.post_user_message(CHAT, "");

        gateway
            .dispatch(ChannelEvent::Pinned {
                chat_id: CHAT,
                message_id: 1,
                notice_id: ours,
                from_bot: true,
            })
            .await;
        gateway
            .dispatch(ChannelEvent::Pinned {
                chat_id: CHAT,
                message_id: 1,
                notice_id: theirs,
                from_bot: false,
            })
            .await;

        assert_eq!(transport.message(CHAT, ours), None);
        assert!(transport.message(CHAT, theirs).is_some());
    }

    #[tokio::test]
    async fn test_unpinned_event_clears_log() {
        let (gateway, transport) = memory_gateway();
        say(&gateway, &transport, ".бег").await;
        say(&gateway, &transport, "/process").await;
        let summary_id = transport.pinned(CHAT).unwrap();

        gateway
            .dispatch(ChannelEvent::Unpinned {
                chat_id: CHAT,
                message_id: summary_id,
            })
            .await;

        let snapshot = gateway.store().snapshot(CHAT).await.unwrap();
        assert!(snapshot.committed.is_empty());
        assert_eq!(snapshot.summary_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_processor_flushes_after_delay() {
        let (gateway, transport) = memory_gateway();
        gateway.start().await.unwrap();

        for text in [".07.00 бег", ".07.05 бег интервалы"] {
            let id = transport.post_user_message(CHAT, text);
            gateway
                .event_sender()
                .send(ChannelEvent::Message(InboundMessage::new(CHAT, id, text)))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(
            transport.pinned_text(CHAT).as_deref(),
            Some("07.05 =бег= (интервалы)")
        );
        assert_eq!(transport.calls(TransportOp::Send), 1);
        assert_eq!(gateway.status().await.conversation_count, 1);
    }

    struct NamedAdapter;

    #[async_trait::async_trait]
    impl ChannelAdapter for NamedAdapter {
        fn name(&self) -> &str {
            "named"
        }

        async fn start(&self, _event_tx: mpsc::Sender<ChannelEvent>) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }

        fn status(&self) -> AdapterStatus {
            AdapterStatus::Running
        }

        fn bot_username(&self) -> Option<String> {
            Some("pinlog_bot".to_string())
        }
    }

    #[tokio::test]
    async fn test_clear_for_other_bot_ignored() {
        let transport = Arc::new(MemoryTransport::new());
        let gateway = GatewayBuilder::new()
            .transport(transport.clone())
            .adapter(Arc::new(NamedAdapter))
            .build()
            .unwrap();

        say(&gateway, &transport, ".бег").await;
        say(&gateway, &transport, "/clear@other_bot").await;
        let snapshot = gateway.store().snapshot(CHAT).await.unwrap();
        assert_eq!(snapshot.pending.len(), 1);
        assert_eq!(transport.calls(TransportOp::Send), 0);

        say(&gateway, &transport, "/clear@pinlog_bot").await;
        assert!(transport.texts(CHAT).contains(&CLEARED_REPLY.to_string()));
        assert!(gateway.store().snapshot(CHAT).await.unwrap().pending.is_empty());
    }

    #[tokio::test]
    async fn test_lane_closes_when_drained() {
        let (gateway, transport) = memory_gateway();
        let id = transport.post_user_message(CHAT, "/start");
        let first = ChannelEvent::Message(InboundMessage::new(CHAT, id, "/start"));

        let Lane { tx, task } = spawn_lane(gateway.dispatcher.clone(), first, None);
        task.await.unwrap();

        assert!(tx.is_closed());
        assert!(tx
            .send(ChannelEvent::Unpinned {
                chat_id: CHAT,
                message_id: 1,
            })
            .is_err());
        assert!(transport.texts(CHAT).contains(&START_REPLY.to_string()));
    }

    #[tokio::test]
    async fn test_lane_waits_for_previous_lane() {
        let (gateway, transport) = memory_gateway();
        transport.set_latency(Some(Duration::from_millis(50)));

        let event = |text: &str| {
            let id = transport.post_user_message(CHAT, text);
            ChannelEvent::Message(InboundMessage::new(CHAT, id, text))
        };

        let first = spawn_lane(gateway.dispatcher.clone(), event("/help"), None);
        let second = spawn_lane(gateway.dispatcher.clone(), event("/start"), Some(first.task));
        second.task.await.unwrap();

        let texts = transport.texts(CHAT);
        let help = texts.iter().position(|t| t == HELP_REPLY).unwrap();
        let start = texts.iter().position(|t| t == START_REPLY).unwrap();
        assert!(help < start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_processor_reopens_lanes() {
        let (gateway, transport) = memory_gateway();
        gateway.start().await.unwrap();

        for text in ["/start", "/help"] {
            let id = transport.post_user_message(CHAT, text);
            gateway
                .event_sender()
                .send(ChannelEvent::Message(InboundMessage::new(CHAT, id, text)))
                .await
                .unwrap();
            // Let the lane drain and close before the next event
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let texts = transport.texts(CHAT);
        assert!(texts.contains(&START_REPLY.to_string()));
        assert!(texts.contains(&HELP_REPLY.to_string()));
    }
}
