//! Service configuration.
//!
//! Loaded once at startup from `config.toml`. Bot tokens may be overridden
//! by environment variables so deployments can keep secrets out of the file.

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The designated raid channel. Challenges and the rolling summary are
    /// scoped to this channel; commands elsewhere are rejected.
    pub raid_channel: Option<String>,
    /// Path of the history ledger file.
    pub history_path: PathBuf,
    pub engine: EngineConfig,
    pub telegram: Option<TelegramConfig>,
    pub discord: Option<DiscordConfig>,
    pub sources: SourcesConfig,
    pub whale: WhaleConfig,
}

/// Monitor loop timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base seconds between metric polls.
    pub poll_interval_secs: u64,
    /// Minimum seconds between progress-display updates.
    pub debounce_secs: u64,
    /// Fractional jitter applied to the poll interval (0.2 = ±20%).
    pub jitter: f64,
    /// Seconds the shutdown sequence may spend unlocking channels.
    pub shutdown_grace_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            debounce_secs: 15,
            jitter: 0.2,
            shutdown_grace_secs: 10,
        }
    }
}

/// Telegram bot credentials and target chat.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// Discord bot credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DiscordConfig {
    pub bot_token: String,
    /// Role whose send-messages permission is toggled on lock/unlock,
    /// normally the guild's @everyone role id.
    pub everyone_role_id: String,
    /// Discord channel that mirrors whale alerts when set.
    pub alert_channel: Option<String>,
}

/// Per-site metric source endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Base URL of the sentiment aggregation API (CMC and Dextools gauges).
    pub sentiment_api_url: String,
    /// Bearer token for the sentiment API.
    pub sentiment_api_token: String,
    /// GeckoTerminal pool page to scrape.
    pub gecko_pool_url: String,
    /// GMGN pool page to scrape.
    pub gmgn_pool_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            sentiment_api_url: "http://localhost:8000".to_owned(),
            sentiment_api_token: String::new(),
            gecko_pool_url: String::new(),
            gmgn_pool_url: String::new(),
        }
    }
}

/// Whale trade feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhaleConfig {
    pub ws_url: String,
    /// Trades below this USD size are ignored.
    pub min_threshold_usd: f64,
    /// Whether qualifying trades are forwarded as channel alerts.
    pub notifications_enabled: bool,
    /// Channel that receives whale alerts.
    pub alert_channel: Option<String>,
}

impl Default for WhaleConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/ws".to_owned(),
            min_threshold_usd: 5_000.0,
            notifications_enabled: true,
            alert_channel: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    /// for secrets (`TELEGRAM_BOT_TOKEN`, `DISCORD_TOKEN`, `API_TOKEN`).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let mut config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN")
            && let Some(telegram) = self.telegram.as_mut()
        {
            telegram.bot_token = token;
        }
        if let Ok(token) = std::env::var("DISCORD_TOKEN")
            && let Some(discord) = self.discord.as_mut()
        {
            discord.bot_token = token;
        }
        if let Ok(token) = std::env::var("API_TOKEN") {
            self.sources.sentiment_api_token = token;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raid_channel: None,
            history_path: PathBuf::from("raid_history.json"),
            engine: EngineConfig::default(),
            telegram: None,
            discord: None,
            sources: SourcesConfig::default(),
            whale: WhaleConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_sections() {
        let config: Config = toml::from_str(
            r#"
            raid_channel = "12345"

            [telegram]
            bot_token = "t"
            chat_id = "-100"
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.raid_channel.as_deref(), Some("12345"));
        assert_eq!(config.engine.poll_interval_secs, 30);
        assert_eq!(config.engine.debounce_secs, 15);
        assert_eq!(config.whale.min_threshold_usd, 5_000.0);
        assert!(config.discord.is_none());
    }

    #[test]
    fn discord_section_parses_with_optional_alert_channel() {
        let config: Config = toml::from_str(
            r#"
            [telegram]
            bot_token = "t"
            chat_id = "-100"

            [discord]
            bot_token = "d"
            everyone_role_id = "42"
            alert_channel = "777"
            "#,
        )
        .expect("config should parse");

        let discord = config.discord.expect("discord section");
        assert_eq!(discord.everyone_role_id, "42");
        assert_eq!(discord.alert_channel.as_deref(), Some("777"));

        let bare: Config = toml::from_str(
            r#"
            [telegram]
            bot_token = "t"
            chat_id = "-100"

            [discord]
            bot_token = "d"
            everyone_role_id = "42"
            "#,
        )
        .expect("config should parse");
        assert!(bare.discord.expect("discord section").alert_channel.is_none());
    }
}
