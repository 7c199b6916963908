use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Top-level config (sendlater.toml + SENDLATER_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendlaterConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub platform: PlatformConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Slash-command verification token issued by the platform when the
    /// command is registered. When unset, token checking is disabled
    /// (local development only).
    pub verification_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            verification_token: None,
        }
    }
}

/// Connection settings for the chat platform's REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL without trailing slash, e.g. "https://chat.example.com".
    pub base_url: String,
    /// Bot access token used as Bearer auth on every request.
    pub bot_token: String,
    /// The bot's own user ID — needed to open direct-message channels
    /// for failure notifications.
    pub bot_user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Delivery retry policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Total attempts per message, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff base delay; attempt N waits base * 2^(N-1).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    2_000
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.sendlater/sendlater.db", home)
}

impl SendlaterConfig {
    /// Load config from a TOML file with SENDLATER_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.sendlater/sendlater.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: SendlaterConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SENDLATER_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.sendlater/sendlater.toml", home)
}
