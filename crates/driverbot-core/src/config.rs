//! DriverBot configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DriverBotError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverBotConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl DriverBotConfig {
    /// Load config from the default path (~/.driverbot/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DriverBotError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DriverBotError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply secrets from the environment on top of the file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = non_empty("DRIVERBOT_BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(id) = non_empty("DRIVERBOT_PANTRY_ID") {
            self.store.pantry_id = id;
        }
        if let Some(token) = non_empty("DRIVERBOT_ADMIN_TOKEN") {
            self.gateway.admin_token = token;
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the DriverBot home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".driverbot")
    }
}

/// Telegram Bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Username used for the questionnaire deep link. Looked up with
    /// `getMe` when empty.
    #[serde(default)]
    pub bot_username: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn default_api_base() -> String { "https://api.telegram.org".into() }
fn default_poll_timeout() -> u64 { 30 }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            bot_username: String::new(),
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

/// Which state store backs the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Pantry,
    File,
    Memory,
}

/// State store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub pantry_id: String,
    #[serde(default = "default_basket")]
    pub basket: String,
    #[serde(default = "default_pantry_base")]
    pub pantry_base: String,
    /// Used by the file backend.
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

fn default_basket() -> String { "driver_data".into() }
fn default_pantry_base() -> String { "https://getpantry.cloud/apiv1/pantry".into() }
fn default_store_path() -> String { "~/.driverbot/state.json".into() }
fn default_store_timeout() -> u64 { 15 }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            pantry_id: String::new(),
            basket: default_basket(),
            pantry_base: default_pantry_base(),
            path: default_store_path(),
            timeout_secs: default_store_timeout(),
        }
    }
}

impl StoreConfig {
    /// File store path with `~` expanded.
    pub fn expanded_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

/// Poll driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// One-off items fire this many seconds before `fire_at`.
    #[serde(default = "default_early_fire")]
    pub early_fire_secs: i64,
}

fn default_poll_interval() -> u64 { 60 }
fn default_early_fire() -> i64 { 60 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            early_fire_secs: default_early_fire(),
        }
    }
}

/// Weekly campaign presentation and time zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// IANA zone name, e.g. "Europe/Berlin".
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Used when `timezone` does not resolve, formatted `+HH:MM`.
    #[serde(default = "default_fallback_offset")]
    pub fallback_utc_offset: String,
    #[serde(default = "default_campaign_message")]
    pub message: String,
    #[serde(default = "default_button_label")]
    pub button_label: String,
    /// Payload for the `t.me/<bot>?start=` deep link.
    #[serde(default = "default_start_payload")]
    pub start_payload: String,
}

fn default_timezone() -> String { "UTC".into() }
fn default_fallback_offset() -> String { "+00:00".into() }
fn default_campaign_message() -> String {
    "Weekly check-in: tell us how this week on the road went. It takes two minutes.".into()
}
fn default_button_label() -> String { "📝 Give feedback".into() }
fn default_start_payload() -> String { "feedback".into() }

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            fallback_utc_offset: default_fallback_offset(),
            message: default_campaign_message(),
            button_label: default_button_label(),
            start_payload: default_start_payload(),
        }
    }
}

/// Admin HTTP endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Empty = no auth.
    #[serde(default)]
    pub admin_token: String,
}

fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            admin_token: String::new(),
        }
    }
}
