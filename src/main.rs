//! Tipbot - Lightning tips for Telegram
//!
//! Every Telegram user gets a custodial wallet on an LNbits instance and
//! can tip, send, receive and pay over Lightning from the chat.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - MongoDB integration (users, invoice events, transactions)
//! - `cache` - Named moka caches
//! - `intercept` - Handler pipelines with before/after/defer interceptors
//! - `runtime` - Per-user locks and settlement retry tickers
//! - `bot` - Dispatcher, interceptors and runners (with Throttle)
//! - `plugins` - Command handlers
//! - `events` - Invoice settlement callbacks
//! - `lnbits` / `node` - Wallet service and LND clients
//! - `api` - Settlement webhook and wallet HTTP API

mod api;
mod bot;
mod cache;
mod config;
mod database;
mod errors;
mod events;
mod i18n;
mod intercept;
mod lnbits;
mod node;
mod plugins;
mod runtime;
mod utils;
mod wallet;

use std::sync::Arc;

use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use cache::CacheRegistry;
use config::Config;
use database::Database;
use lnbits::LnbitsClient;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const DEFAULT_LOG_FILTER: &str = "tipbot=info,teloxide=warn";

/// Console logging, plus a daily rolling file when `LOG_DIR` is set. The
/// returned guard flushes the file writer and must live until exit.
fn init_logging(config: &Config) -> Option<WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let Some(dir) = &config.log_dir else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
        return None;
    };

    use tracing_appender::{
        non_blocking,
        rolling::{RollingFileAppender, Rotation},
    };

    let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, "tipbot.log");
    let (writer, guard) = non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .with(filter())
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env()?);
    let _log_guard = init_logging(&config);

    info!("Starting tipbot...");
    info!("Bot mode: {:?}", config.bot_mode);

    info!("Connecting to MongoDB...");
    let db = Database::connect(&config.mongodb_uri, &config.mongodb_database).await?;
    info!("Database connected");

    let cache = Arc::new(CacheRegistry::new());
    let lnbits = LnbitsClient::new(
        &config.lnbits_url,
        &config.lnbits_admin_key,
        &config.lnbits_admin_id,
        config.lnbits_webhook_url.clone(),
    )?;

    // Throttle keeps us inside Telegram's rate limits:
    // 30 msg/s globally, 1 msg/s per chat, 20 msg/min per group.
    let bot = Bot::new(&config.bot_token).throttle(Limits::default());

    let me = bot.get_me().await?;
    let bot_username = config
        .bot_username
        .clone()
        .unwrap_or_else(|| me.username().to_string());
    info!("Using bot username: @{}", bot_username);

    if let Err(e) = bot.set_my_commands(plugins::Command::bot_commands()).await {
        warn!("Could not set command menu: {}", e);
    }

    let state = bot::AppState::new(config.clone(), &db, cache, lnbits, bot_username);
    let registry = Arc::new(plugins::register_all());
    info!("Registered {} endpoints", registry.len());

    let shutdown = CancellationToken::new();
    let api_state = api::ApiState {
        app: state.clone(),
        dispatcher: Arc::new(events::invoice_dispatcher(bot.clone(), state.clone())),
    };
    let api_task = {
        let addr = config.api_listen_addr;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(addr, api_state, shutdown).await {
                error!("API server stopped: {:#}", e);
            }
        })
    };

    let dispatcher = bot::build_dispatcher(bot.clone(), state, registry);
    let result = bot::run(&config, bot, dispatcher).await;

    info!("Shutting down...");
    shutdown.cancel();
    if let Err(e) = api_task.await {
        warn!("API task ended abnormally: {}", e);
    }
    result
}
