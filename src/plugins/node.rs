//! /node: the user's own LND node.
//!
//! `/node` shows the registered node, `/node add <host> <macaroon> <cert>`
//! registers one, `/node invoice <amount>` creates an invoice on it,
//! `/node check` watches the last one until it settles and
//! `/node proxy <amount>` creates a wallet invoice whose payment is
//! relayed to the node.

use std::ops::ControlFlow;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode};
use tracing::{debug, info, warn};

use crate::bot::interceptors::{
    answer_callback, lock, log_message, require_private_chat, require_user, unlock,
};
use crate::bot::{AppState, ThrottledBot};
use crate::cache::{CacheConfig, TypedCache};
use crate::database::{InvoiceCallback, LndParams, WalletUser};
use crate::errors::{BotError, BotResult};
use crate::i18n;
use crate::intercept::{Endpoint, HandlerRegistry, LogFields, Pipeline, Step, UpdateContext};
use crate::node::{parse_node_params, NodeError, NodeInvoice};
use crate::plugins::invoice::invoice_memo;
use crate::runtime::RetryTicker;
use crate::utils::{argument, html_escape, parse_amount, user_str};
use crate::wallet::{self, EventOrigin};

const NODE_INVOICE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub fn register(registry: &mut HandlerRegistry<UpdateContext>) {
    registry.register(
        &[Endpoint::command("node")],
        Pipeline::new(node_handler)
            .before(lock)
            .before(require_private_chat)
            .before(require_user)
            .before(log_message)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "nodeHandler", "/node")),
    );
    registry.register(
        &[Endpoint::callback("node_check")],
        Pipeline::new(check_button_handler)
            .before(lock)
            .before(require_user)
            .before(answer_callback)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "satdressCheckInvoiceHandler", "node_check")),
    );
}

/// Last node invoice per user, by Telegram id.
pub fn node_invoices(state: &AppState) -> TypedCache<u64, NodeInvoice> {
    state.cache.get_or_create(
        "node_invoices",
        CacheConfig::default().ttl(NODE_INVOICE_TTL),
    )
}

/// Status message of a node invoice check, by payment hash.
fn check_messages(state: &AppState) -> TypedCache<String, (ChatId, MessageId)> {
    state.cache.get_or_create(
        "node_check_messages",
        CacheConfig::default().ttl(NODE_INVOICE_TTL),
    )
}

async fn node_handler(mut ctx: UpdateContext) -> Step<UpdateContext> {
    let subcommand = argument(ctx.text(), 1).map(str::to_lowercase);
    let result = match subcommand.as_deref() {
        None => show_node(&ctx).await,
        Some("add") => add_node(&mut ctx).await,
        Some("invoice") => node_invoice(&ctx).await,
        Some("check") => check_invoice(&ctx).await,
        Some("proxy") => proxy_invoice(&ctx).await,
        Some(_) => Err(BotError::InvalidSyntax),
    };
    ctx.finish(result)
}

async fn check_button_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = check_invoice(&ctx).await;
    ctx.finish(result)
}

fn registered_node(user: &WalletUser) -> BotResult<&LndParams> {
    user.node.as_ref().ok_or(BotError::NoNode)
}

fn node_info(ctx: &UpdateContext, node: &LndParams) -> String {
    ctx.t_with(
        "node.info",
        &[
            ("host", &html_escape(&node.host)),
            ("macaroon", &html_escape(&node.macaroon)),
            ("cert", &html_escape(&node.cert)),
        ],
    )
}

async fn show_node(ctx: &UpdateContext) -> BotResult<()> {
    let node = registered_node(ctx.require_user()?)?;
    let text = format!("{}\n\n{}", ctx.t("node.your_node"), node_info(ctx, node));
    ctx.reply(text).await?;
    Ok(())
}

async fn add_node(ctx: &mut UpdateContext) -> BotResult<()> {
    let args: Vec<&str> = ctx.text().split_whitespace().skip(2).collect();
    let params = parse_node_params(&args).map_err(|e| match e {
        NodeError::InvalidParams(_) | NodeError::InvalidCertificate => BotError::InvalidSyntax,
        other => BotError::Node(other),
    })?;

    let mut user = ctx.require_user()?.clone();
    info!("{} registered node {}", user_str(&user), params.host);
    user.node = Some(params);
    ctx.state.users.save(&user).await?;

    // Stop checks against the old node.
    if ctx.state.tickers.cancel(&check_ticker_name(user.telegram_id)) {
        debug!("Stopped settlement check on the previous node of {}", user_str(&user));
    }

    let text = format!(
        "{}\n\n{}",
        ctx.t("node.added"),
        node_info(ctx, registered_node(&user)?)
    );
    ctx.reply(text).await?;
    ctx.user = Some(user);
    Ok(())
}

async fn node_invoice(ctx: &UpdateContext) -> BotResult<()> {
    let user = ctx.require_user()?;
    let node = registered_node(user)?;
    let amount = parse_amount(argument(ctx.text(), 2).ok_or(BotError::InvalidSyntax)?)?;

    let memo = invoice_memo(None, &ctx.state.bot_username);
    let invoice = ctx.state.nodes.get_invoice(node, amount, &memo).await?;
    debug!("Node invoice of {}: {}", user_str(user), invoice.r_hash);

    let text = ctx.t_with(
        "node.invoice",
        &[
            ("amount", &amount.to_string()),
            ("pr", &html_escape(&invoice.payment_request)),
        ],
    );
    ctx.reply(text).await?;
    node_invoices(&ctx.state).insert(user.telegram_id, invoice);

    check_invoice(ctx).await
}

async fn proxy_invoice(ctx: &UpdateContext) -> BotResult<()> {
    let user = ctx.require_user()?;
    registered_node(user)?;
    let amount = parse_amount(argument(ctx.text(), 2).ok_or(BotError::InvalidSyntax)?)?;
    let chat_id = ctx.chat_id().ok_or(BotError::NoSender)?;

    let memo = invoice_memo(None, &ctx.state.bot_username);
    let creating = ctx.reply(ctx.t("invoice.creating")).await?;
    let event = wallet::create_invoice_with_event(
        &ctx.state,
        user,
        amount,
        &memo,
        InvoiceCallback::NodeRelay,
        EventOrigin {
            chat_id: chat_id.0,
            message_id: Some(creating.id.0),
            language_code: &ctx.locale,
        },
    )
    .await?;

    let text = ctx.t_with(
        "node.proxy_invoice",
        &[
            ("amount", &amount.to_string()),
            ("pr", &html_escape(&event.invoice.payment_request)),
        ],
    );
    ctx.edit_html(chat_id, creating.id, text, None).await?;
    Ok(())
}

fn check_ticker_name(telegram_id: u64) -> String {
    format!("node:{}", telegram_id)
}

/// Watch the user's last node invoice with a retry ticker. The status
/// message is reused across checks of the same invoice.
async fn check_invoice(ctx: &UpdateContext) -> BotResult<()> {
    let user = ctx.require_user()?;
    let node = registered_node(user)?.clone();
    let Some(invoice) = node_invoices(&ctx.state).get(&user.telegram_id) else {
        ctx.send_to_user(user.telegram_id, ctx.t("node.no_invoice"))
            .await?;
        return Ok(());
    };

    let messages = check_messages(&ctx.state);
    let checking = ctx.t("node.checking");
    let (chat_id, message_id) = match messages.get(&invoice.r_hash) {
        Some((chat_id, message_id)) => {
            if let Err(e) = ctx.edit_html(chat_id, message_id, checking, None).await {
                debug!("Could not reuse check message: {}", e);
            }
            (chat_id, message_id)
        }
        None => {
            let sent = ctx.send_to_user(user.telegram_id, checking).await?;
            (sent.chat.id, sent.id)
        }
    };
    messages.insert(invoice.r_hash.clone(), (chat_id, message_id));

    let config = &ctx.state.config;
    let ticker = RetryTicker::new(
        check_ticker_name(user.telegram_id),
        config.node_check_interval,
        config.node_check_deadline,
    );
    let status = StatusMessage {
        bot: ctx.bot.clone(),
        chat_id,
        message_id,
        locale: ctx.locale.clone(),
    };

    let check = {
        let nodes = ctx.state.nodes.clone();
        let cache = node_invoices(&ctx.state);
        let user_id = user.telegram_id;
        move || {
            let nodes = nodes.clone();
            let cache = cache.clone();
            let node = node.clone();
            let invoice = invoice.clone();
            async move {
                match nodes.check_invoice(&node, &invoice).await {
                    Ok(checked) => {
                        let settled = checked.is_settled();
                        cache.insert(user_id, checked);
                        if settled {
                            ControlFlow::Break(())
                        } else {
                            ControlFlow::Continue(())
                        }
                    }
                    Err(e) => {
                        warn!("Checking node invoice of {} failed: {}", user_id, e);
                        ControlFlow::Continue(())
                    }
                }
            }
        }
    };

    if ctx.state.tickers.is_running(ticker.name()) {
        debug!("Restarting settlement check of {}", user_str(user));
    }

    let settled = status.clone();
    let user_id = user.telegram_id;
    ctx.state.tickers.spawn(
        ticker,
        check,
        move || settled.show("node.settled", false),
        move || {
            let error = BotError::NotSettled;
            info!("Node invoice of {}: {}", user_id, error);
            status.show(error.user_message_key().unwrap_or("node.not_settled"), true)
        },
    );
    Ok(())
}

/// The check status message, updated from the ticker's callbacks.
#[derive(Clone)]
struct StatusMessage {
    bot: ThrottledBot,
    chat_id: ChatId,
    message_id: MessageId,
    locale: String,
}

impl StatusMessage {
    fn show(self, key: &'static str, check_again: bool) {
        tokio::spawn(async move {
            let mut request = self
                .bot
                .edit_message_text(self.chat_id, self.message_id, i18n::get_text(&self.locale, key))
                .parse_mode(ParseMode::Html);
            if check_again {
                request = request.reply_markup(InlineKeyboardMarkup::new(vec![vec![
                    InlineKeyboardButton::callback(
                        i18n::get_text(&self.locale, "node.check_button"),
                        "node_check",
                    ),
                ]]));
            }
            if let Err(e) = request.await {
                debug!("Could not update check message: {}", e);
            }
        });
    }
}
