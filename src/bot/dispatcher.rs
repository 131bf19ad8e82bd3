//! Update dispatching.
//!
//! teloxide hands every message and callback query to the handler
//! registry, which runs the matching pipeline.

use std::sync::Arc;

use teloxide::adaptors::Throttle;
use teloxide::dispatching::{DefaultKey, UpdateHandler};
use teloxide::prelude::*;
use tracing::{debug, error, warn};

use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::config::Config;
use crate::errors::ErrorKind;
use crate::database::{Database, InvoiceEventStore, MongoInvoiceEvents, TransactionRepo, UserRepo};
use crate::i18n;
use crate::intercept::{ChainError, ChatUpdate, Endpoint, HandlerRegistry, Stage, UpdateContext};
use crate::lnbits::LnbitsClient;
use crate::node::NodeClient;
use crate::runtime::{TickerRegistry, UserLocks};

/// Bot with the Throttle adaptor for Telegram's rate limits.
pub type ThrottledBot = Throttle<Bot>;

pub type Registry = Arc<HandlerRegistry<UpdateContext>>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<CacheRegistry>,
    pub users: Arc<UserRepo>,
    pub transactions: Arc<TransactionRepo>,
    pub invoice_events: Arc<dyn InvoiceEventStore>,
    pub lnbits: LnbitsClient,
    pub nodes: NodeClient,
    pub locks: UserLocks,
    pub tickers: TickerRegistry,
    /// Cached balances in sat, by Telegram id.
    pub balances: TypedCache<u64, i64>,
    /// Bot username without `@`.
    pub bot_username: String,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        db: &Database,
        cache: Arc<CacheRegistry>,
        lnbits: LnbitsClient,
        bot_username: String,
    ) -> Self {
        Self {
            users: Arc::new(UserRepo::new(db, &cache)),
            transactions: Arc::new(TransactionRepo::new(db)),
            invoice_events: Arc::new(MongoInvoiceEvents::new(db)),
            nodes: NodeClient::new(config.http_proxy.clone()),
            locks: UserLocks::new(),
            tickers: TickerRegistry::new(),
            balances: cache.get_or_create("balances", CacheConfig::balances()),
            lnbits,
            cache,
            config,
            bot_username,
        }
    }
}

#[cfg(test)]
impl AppState {
    /// State over [`Config::for_tests`] with an in-memory invoice event
    /// store. Wallet service calls fail fast with a connection error.
    pub async fn for_tests() -> Self {
        let config = Arc::new(Config::for_tests());
        let db = Database::lazy(&config.mongodb_uri, &config.mongodb_database)
            .await
            .expect("test database handle");
        let lnbits = LnbitsClient::new(
            &config.lnbits_url,
            config.lnbits_admin_key.clone(),
            config.lnbits_admin_id.clone(),
            None,
        )
        .expect("test wallet client");

        let mut state = Self::new(config, &db, Arc::new(CacheRegistry::new()), lnbits, "tipbot".to_string());
        state.invoice_events = Arc::new(crate::database::MemoryInvoiceEvents::new());
        state
    }
}

pub fn build_dispatcher(
    bot: ThrottledBot,
    state: AppState,
    registry: Registry,
) -> Dispatcher<ThrottledBot, anyhow::Error, DefaultKey> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state, registry])
        .enable_ctrlc_handler()
        .build()
}

fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback))
}

async fn on_message(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    registry: Registry,
) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(endpoint) = Endpoint::from_text(text, &state.bot_username) else {
        return Ok(());
    };
    if !registry.contains(&endpoint) {
        return Ok(());
    }

    let ctx = UpdateContext::new(state, bot, ChatUpdate::Message(msg));
    run(&registry, endpoint, ctx).await;
    Ok(())
}

async fn on_callback(
    bot: ThrottledBot,
    query: CallbackQuery,
    state: AppState,
    registry: Registry,
) -> anyhow::Result<()> {
    let Some(data) = query.data.as_deref() else {
        return Ok(());
    };
    let endpoint = Endpoint::from_callback_data(data);
    if !registry.contains(&endpoint) {
        debug!("No handler for callback {}", data);
        return Ok(());
    }

    let ctx = UpdateContext::new(state, bot, ChatUpdate::Callback(query));
    run(&registry, endpoint, ctx).await;
    Ok(())
}

/// Run the pipeline and tell the user about handler failures.
async fn run(registry: &HandlerRegistry<UpdateContext>, endpoint: Endpoint, ctx: UpdateContext) {
    let trace_id = ctx.trace_id.to_string();
    let bot = ctx.bot.clone();
    let chat_id = ctx.chat_id();
    let locale = i18n::resolve_locale(ctx.sender().and_then(|u| u.language_code.as_deref()));

    let Some(Err(ChainError { stage, source })) = registry.dispatch(&endpoint, ctx, &trace_id).await
    else {
        return;
    };

    if stage != Stage::Handler {
        debug!("{} stopped before its handler: {}", endpoint, source);
        return;
    }

    if source.kind() == ErrorKind::Internal {
        error!("{} failed [{}]: {:#}", endpoint, trace_id, source);
    } else {
        warn!("{} failed [{}]: {}", endpoint, trace_id, source);
    }
    if let (Some(chat_id), Some(key)) = (chat_id, source.user_message_key()) {
        let text = i18n::get_text(&locale, key);
        if let Err(e) = bot.send_message(chat_id, text).await {
            debug!("Could not report error to {}: {}", chat_id, e);
        }
    }
}
