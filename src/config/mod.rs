//! Configuration from environment variables (and `.env`).

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    #[default]
    Polling,
    Webhook,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub bot_mode: BotMode,
    pub webhook_url: Option<String>,
    pub webhook_port: u16,
    pub webhook_secret: Option<String>,
    /// Without `@`. Fetched via `getMe` when unset.
    pub bot_username: Option<String>,

    // MongoDB
    pub mongodb_uri: String,
    pub mongodb_database: String,

    // LNbits
    pub lnbits_url: String,
    pub lnbits_admin_key: String,
    pub lnbits_admin_id: String,
    /// Public URL LNbits posts paid invoices to.
    pub lnbits_webhook_url: Option<String>,

    /// REST API and LNbits webhook listener.
    pub api_listen_addr: SocketAddr,

    // User nodes
    pub http_proxy: Option<String>,
    pub node_check_interval: Duration,
    pub node_check_deadline: Duration,

    /// Daily rolling log files go here when set.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let bot_mode = match optional("BOT_MODE").map(|m| m.to_lowercase()).as_deref() {
            Some("webhook") => BotMode::Webhook,
            _ => BotMode::Polling,
        };

        let webhook_url = optional("WEBHOOK_URL");
        if bot_mode == BotMode::Webhook && webhook_url.is_none() {
            bail!("WEBHOOK_URL must be set when BOT_MODE is webhook");
        }

        let bot_username = optional("BOT_USERNAME").map(|s| s.trim_start_matches('@').to_string());

        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            bot_mode,
            webhook_url,
            webhook_port: parsed("WEBHOOK_PORT", 8443)?,
            webhook_secret: optional("WEBHOOK_SECRET"),
            bot_username,
            mongodb_uri: required("MONGODB_URI")?,
            mongodb_database: optional("MONGODB_DATABASE").unwrap_or_else(|| "tipbot".to_string()),
            lnbits_url: required("LNBITS_URL")?,
            lnbits_admin_key: required("LNBITS_ADMIN_KEY")?,
            lnbits_admin_id: required("LNBITS_ADMIN_ID")?,
            lnbits_webhook_url: optional("LNBITS_WEBHOOK_URL"),
            api_listen_addr: parsed("API_LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 6000)))?,
            http_proxy: optional("HTTP_PROXY"),
            node_check_interval: Duration::from_secs(parsed("NODE_CHECK_INTERVAL_SECS", 5)?),
            node_check_deadline: Duration::from_secs(parsed("NODE_CHECK_DEADLINE_SECS", 10)?),
            log_dir: optional("LOG_DIR").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
impl Config {
    /// Local-only settings for tests; nothing here is reachable.
    pub fn for_tests() -> Self {
        Self {
            bot_token: "123:test".to_string(),
            bot_mode: BotMode::Polling,
            webhook_url: None,
            webhook_port: 8443,
            webhook_secret: None,
            bot_username: Some("tipbot".to_string()),
            mongodb_uri: "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=100".to_string(),
            mongodb_database: "tipbot_test".to_string(),
            lnbits_url: "http://127.0.0.1:1".to_string(),
            lnbits_admin_key: "admin".to_string(),
            lnbits_admin_id: "admin-id".to_string(),
            lnbits_webhook_url: None,
            api_listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            http_proxy: None,
            node_check_interval: Duration::from_secs(1),
            node_check_deadline: Duration::from_secs(2),
            log_dir: None,
        }
    }
}

/// Set and non-empty.
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &str) -> Result<String> {
    optional(name).with_context(|| format!("{} must be set", name))
}

fn parsed<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(name) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        None => Ok(default),
    }
}
