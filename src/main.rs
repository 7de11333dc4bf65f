//! Pinlog - Telegram note aggregator
//!
//! Collects marked notes into one pinned, categorized running log per chat.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pinlog::{
    aggregator::{EntryClock, EntryParser, ParsedEntry},
    category::CategoryMatcher,
    channels::{ChannelEvent, InboundMessage, MemoryTransport},
    config::PinlogConfig,
    gateway::{ApiHandler, Gateway, GatewayBuilder},
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Conversation used by `simulate`
const SIMULATED_CHAT: i64 = 1;

#[derive(Parser)]
#[command(name = "pinlog")]
#[command(version)]
#[command(about = "Telegram note aggregator with a pinned running log")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PINLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot and the HTTP API
    Run {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Do not serve the HTTP API
        #[arg(long)]
        no_http: bool,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },

    /// Show how a note would be categorized
    Classify {
        /// Note text, without the entry marker; may start with `HH.MM`
        text: String,
    },

    /// Feed stdin lines through an in-memory chat and print the summary
    Simulate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("pinlog={},tower_http=info", log_level).into());
    tracing_subscriber::registry()
        .with(filter)
        .with(cli.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    match cli.command {
        Commands::Config { default: true } => show_config(&PinlogConfig::default())?,
        command => {
            let config = PinlogConfig::load(cli.config.as_deref())
                .context("Failed to load configuration")?;
            match command {
                Commands::Run {
                    host,
                    port,
                    no_http,
                } => run_gateway(config, host, port, no_http).await?,
                Commands::Config { .. } => show_config(&config)?,
                Commands::Classify { text } => classify(&config, &text)?,
                Commands::Simulate => simulate(config).await?,
            }
        }
    }

    Ok(())
}

async fn run_gateway(
    mut config: PinlogConfig,
    host: Option<String>,
    port: Option<u16>,
    no_http: bool,
) -> Result<()> {
    if no_http {
        config.gateway.http_enabled = false;
    }

    let mut builder = GatewayBuilder::new().config(config);
    if let Some(host) = host {
        builder = builder.host(host);
    }
    if let Some(port) = port {
        builder = builder.port(port);
    }
    let gateway = Arc::new(builder.build()?);

    gateway.start().await?;

    if gateway.config().gateway.http_enabled {
        let addr = format!(
            "{}:{}",
            gateway.config().gateway.host,
            gateway.config().gateway.port
        );
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!("HTTP API listening on {}", addr);

        axum::serve(listener, ApiHandler::router(gateway.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        tracing::info!("Pinlog is running. Press Ctrl+C to stop.");
        shutdown_signal().await;
    }

    tracing::info!("Shutting down...");
    gateway.stop().await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
}

fn show_config(config: &PinlogConfig) -> Result<()> {
    let mut config = config.clone();
    if !config.telegram.bot_token.is_empty() {
        config.telegram.bot_token = "<redacted>".to_string();
    }
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}

fn classify(config: &PinlogConfig, text: &str) -> Result<()> {
    let Some(entry) = parse_note(config, text)? else {
        println!("not an entry");
        return Ok(());
    };

    match &entry.label {
        Some(label) => println!("label:     {}", label),
        None => println!("label:     (none)"),
    }
    println!("time:      {}", entry.timestamp);
    println!("text:      {}", entry.text);
    Ok(())
}

/// Run `text` through the same parser live entries use
fn parse_note(config: &PinlogConfig, text: &str) -> Result<Option<ParsedEntry>> {
    let clock = EntryClock::from_offset_minutes(config.aggregator.utc_offset_minutes)?;
    let matcher = Arc::new(CategoryMatcher::new(&config.categories.labels));
    let parser = EntryParser::new(config.aggregator.entry_marker, clock, matcher)?;

    let raw = format!("{}{}", config.aggregator.entry_marker, text.trim());
    Ok(parser.parse(&raw, None))
}

async fn simulate(config: PinlogConfig) -> Result<()> {
    let transport = Arc::new(MemoryTransport::new());
    let gateway = GatewayBuilder::new()
        .config(config)
        .transport(transport.clone())
        .build()?;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        feed(&gateway, &transport, &line).await;
    }
    feed(&gateway, &transport, "/process").await;

    match transport.pinned_text(SIMULATED_CHAT) {
        Some(summary) => println!("{}", summary),
        None => println!("(no pinned summary)"),
    }

    Ok(())
}

async fn feed(gateway: &Gateway, transport: &MemoryTransport, text: &str) {
    let message_id = transport.post_user_message(SIMULATED_CHAT, text);
    let message = InboundMessage::new(SIMULATED_CHAT, message_id, text)
        .sent_at(chrono::Utc::now());
    gateway.dispatch(ChannelEvent::Message(message)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_matches_live_entries() {
        let config = PinlogConfig::default();

        let entry = parse_note(&config, "Пианино гаммы").unwrap().unwrap();
        assert_eq!(entry.label.as_deref(), Some("пианино"));
        assert_eq!(entry.text, "=пианино= (гаммы)");

        let entry = parse_note(&config, " 07.30 бег 5км ").unwrap().unwrap();
        assert_eq!(entry.timestamp.to_string(), "07.30");
        assert_eq!(entry.text, "=бег= (5км)");
    }
}
