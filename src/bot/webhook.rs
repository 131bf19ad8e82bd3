//! Webhook mode for receiving Telegram updates.
//!
//! Uses teloxide's axum webhook support to:
//! - Call `setWebhook` on Telegram with the configured URL and secret
//! - Spawn an axum HTTP server that receives updates
//! - Call `deleteWebhook` again on shutdown

use std::net::SocketAddr;

use anyhow::Context;
use teloxide::dispatching::DefaultKey;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks::{self, Options};
use tracing::info;
use url::Url;

use super::dispatcher::ThrottledBot;
use crate::config::Config;

/// Start the bot in webhook mode.
///
/// This function:
/// 1. Parses `WEBHOOK_URL` from config
/// 2. Builds the listener options (address, URL, optional secret token)
/// 3. Registers the webhook with Telegram and starts the axum server
/// 4. Dispatches updates until the dispatcher is shut down
///
/// Fails when `WEBHOOK_URL` is missing or malformed, or when Telegram
/// rejects the webhook registration.
pub async fn start_webhook(
    config: &Config,
    mut dispatcher: Dispatcher<ThrottledBot, anyhow::Error, DefaultKey>,
    bot: ThrottledBot,
) -> anyhow::Result<()> {
    let webhook_url = config
        .webhook_url
        .as_deref()
        .context("WEBHOOK_URL must be set when using webhook mode")?;
    let url = Url::parse(webhook_url).context("Invalid WEBHOOK_URL")?;

    // Listen on all interfaces at the configured port.
    let address = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    let mut options = Options::new(address, url.clone());
    if let Some(secret) = &config.webhook_secret {
        options = options.secret_token(secret.clone());
        info!("Webhook secret token configured");
    }

    info!("Setting webhook URL {}", url);
    info!("Listening for updates on {}", address);

    // Registration only needs the plain bot, not the throttled adaptor.
    let listener = webhooks::axum(bot.inner().clone(), options)
        .await
        .context("Failed to set up webhook")?;

    info!("Webhook set up, waiting for updates");

    let error_handler = LoggingErrorHandler::with_custom_text("Error from update listener");
    dispatcher
        .dispatch_with_listener(listener, error_handler)
        .await;

    info!("Webhook listener stopped");
    Ok(())
}
