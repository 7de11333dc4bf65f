//! Pinlog configuration management

use crate::category::default_labels;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `telegram.bot_token`
pub const BOT_TOKEN_ENV: &str = "BOT_TOKEN";

/// Main Pinlog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PinlogConfig {
    /// HTTP gateway configuration
    pub gateway: GatewayConfig,

    /// Telegram channel configuration
    pub telegram: TelegramConfig,

    /// Aggregation engine configuration
    pub aggregator: AggregatorConfig,

    /// Category dictionary
    pub categories: CategoriesConfig,
}

impl PinlogConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the configuration the way the binary does it: an explicit
    /// path wins, then `<config_dir>/pinlog/config.toml`, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => {
                    tracing::info!(path = %path.display(), "Loading configuration");
                    Self::from_file(&path)?
                }
                None => Self::default(),
            },
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.telegram.bot_token = token.trim().to_string();
            }
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.aggregator.flush_delay_secs == 0 {
            return Err(Error::Config(
                "aggregator.flush_delay_secs must be greater than zero".to_string(),
            ));
        }
        if self.aggregator.call_timeout_secs == 0 {
            return Err(Error::Config(
                "aggregator.call_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !self
            .aggregator
            .remove_last_command
            .starts_with(self.aggregator.entry_marker)
        {
            return Err(Error::Config(format!(
                "aggregator.remove_last_command '{}' must start with the entry marker '{}'",
                self.aggregator.remove_last_command, self.aggregator.entry_marker
            )));
        }
        if let Some(minutes) = self.aggregator.utc_offset_minutes {
            if minutes.abs() >= 24 * 60 {
                return Err(Error::Config(format!(
                    "aggregator.utc_offset_minutes {} is out of range",
                    minutes
                )));
            }
        }
        if let Some(blank) = self.categories.labels.iter().position(|l| l.trim().is_empty()) {
            return Err(Error::Config(format!(
                "categories.labels[{}] is blank",
                blank
            )));
        }
        Ok(())
    }
}

/// Default location of the configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join("pinlog").join("config.toml"))
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Serve the health/API endpoints
    pub http_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            http_enabled: true,
        }
    }
}

/// Telegram channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather (usually supplied through `BOT_TOKEN`)
    pub bot_token: String,

    /// Bot API base URL
    pub api_base: String,

    /// Long-polling timeout in seconds
    pub polling_timeout_secs: u64,

    /// Timeout for a single non-polling API request in seconds
    pub request_timeout_secs: u64,
}

impl TelegramConfig {
    /// Whether a token is present
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: "https://api.telegram.org".to_string(),
            polling_timeout_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

/// Aggregation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Delay between an entry arriving and the automatic flush
    pub flush_delay_secs: u64,

    /// Upper bound for every transport call made by the engine
    pub call_timeout_secs: u64,

    /// Leading character that marks a message as a log entry
    pub entry_marker: char,

    /// Message text that removes the last summary line
    pub remove_last_command: String,

    /// Fixed UTC offset for entry timestamps; `None` uses the host zone
    pub utc_offset_minutes: Option<i32>,
}

impl AggregatorConfig {
    pub fn flush_delay(&self) -> Duration {
        Duration::from_secs(self.flush_delay_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            flush_delay_secs: 2,
            call_timeout_secs: 10,
            entry_marker: '.',
            remove_last_command: ".-".to_string(),
            utc_offset_minutes: None,
        }
    }
}

/// Category dictionary configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoriesConfig {
    /// Known labels; order is irrelevant for matching
    pub labels: Vec<String>,
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            labels: default_labels(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PinlogConfig::default();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.aggregator.flush_delay_secs, 2);
        assert_eq!(config.aggregator.entry_marker, '.');
        assert!(!config.telegram.is_configured());
        assert!(config.categories.labels.iter().any(|l| l == "уд155"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PinlogConfig = toml::from_str(
            r#"
            [aggregator]
            flush_delay_secs = 5

            [categories]
            labels = ["yoga", "guitar"]
            "#,
        )
        .unwrap();

        assert_eq!(config.aggregator.flush_delay_secs, 5);
        assert_eq!(config.aggregator.call_timeout_secs, 10);
        assert_eq!(config.categories.labels, vec!["yoga", "guitar"]);
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
    }

    #[test]
    fn test_validate_rejects_zero_delay() {
        let mut config = PinlogConfig::default();
        config.aggregator.flush_delay_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_blank_label() {
        let mut config = PinlogConfig::default();
        config.categories.labels = vec!["yoga".to_string(), "  ".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("labels[1]"));
    }

    #[test]
    fn test_validate_rejects_foreign_remove_command() {
        let mut config = PinlogConfig::default();
        config.aggregator.remove_last_command = "-".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_offset_out_of_range() {
        let mut config = PinlogConfig::default();
        config.aggregator.utc_offset_minutes = Some(180);
        assert!(config.validate().is_ok());
        config.aggregator.utc_offset_minutes = Some(-1440);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[gateway]\nport = 9000\n\n[telegram]\nbot_token = \"abc\""
        )
        .unwrap();

        let config = PinlogConfig::from_file(file.path()).unwrap();
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.telegram.bot_token, "abc");
        assert!(config.telegram.is_configured());
    }

    #[test]
    fn test_from_file_missing() {
        let err = PinlogConfig::from_file("/nonexistent/pinlog.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_serialize_roundtrip_keeps_marker() {
        let config = PinlogConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: PinlogConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.aggregator.entry_marker, '.');
        assert_eq!(parsed.aggregator.remove_last_command, ".-");
    }
}
