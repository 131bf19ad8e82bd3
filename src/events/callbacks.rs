//! Handlers for settled invoices.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode, ReplyParameters};
use tracing::{error, info, warn};

use super::dispatcher::InvoiceDispatcher;
use crate::bot::{AppState, ThrottledBot};
use crate::database::{CallbackKind, InvoiceEvent};
use crate::errors::{BotError, BotResult};
use crate::i18n::{get_text, get_text_with};
use crate::plugins::node::node_invoices;
use crate::utils::html_escape;
use crate::wallet;

/// Dispatcher with every callback kind wired up.
pub fn invoice_dispatcher(bot: ThrottledBot, state: AppState) -> InvoiceDispatcher {
    let generic = (bot.clone(), state.clone());
    let relay = (bot, state.clone());

    InvoiceDispatcher::new(state.invoice_events.clone())
        .on(CallbackKind::Generic, move |event| {
            let (bot, state) = generic.clone();
            async move { notify_invoice_received(&bot, &state, &event).await }
        })
        .on(CallbackKind::NodeRelay, move |event| {
            let (bot, state) = relay.clone();
            async move {
                if let Err(e) = node_relay(&bot, &state, &event).await {
                    error!("Relay of invoice {} failed: {}", event.invoice.payment_hash, e);
                }
            }
        })
}

/// Where the settlement notice for `event` goes: a reply to the invoice
/// message when there is one, otherwise the user's private chat.
fn notice_target(event: &InvoiceEvent) -> (ChatId, Option<ReplyParameters>) {
    match event.message_id {
        Some(message_id) => (
            ChatId(event.chat_id),
            Some(ReplyParameters::new(MessageId(message_id)).allow_sending_without_reply()),
        ),
        None => (UserId(event.user_id).into(), None),
    }
}

async fn send(bot: &ThrottledBot, user_id: u64, text: String) {
    if let Err(e) = bot
        .send_message(UserId(user_id), text)
        .parse_mode(ParseMode::Html)
        .await
    {
        warn!("Could not notify {}: {}", user_id, e);
    }
}

/// Tell the receiver the money arrived and refresh their balance.
pub async fn notify_invoice_received(bot: &ThrottledBot, state: &AppState, event: &InvoiceEvent) {
    match state.users.get(event.user_id).await {
        Ok(Some(user)) => {
            if let Err(e) = wallet::refresh_balance(state, &user).await {
                warn!("Could not refresh balance of {}: {}", event.user_id, e);
            }
        }
        Ok(None) => warn!("Invoice paid for unknown user {}", event.user_id),
        Err(e) => warn!("Could not load user {}: {}", event.user_id, e),
    }

    let amount = event.invoice.amount.to_string();
    let text = get_text_with(&event.language_code, "invoice.received", &[("amount", &amount)]);

    let (chat_id, reply_to) = notice_target(event);
    let mut request = bot.send_message(chat_id, text).parse_mode(ParseMode::Html);
    if let Some(reply_to) = reply_to {
        request = request.reply_parameters(reply_to);
    }
    if let Err(e) = request.await {
        warn!("Could not notify {}: {}", event.user_id, e);
    }
}

/// Forward a settled proxy invoice to the user's own node.
async fn node_relay(bot: &ThrottledBot, state: &AppState, event: &InvoiceEvent) -> BotResult<()> {
    let lang = &event.language_code;
    let user = state
        .users
        .get(event.user_id)
        .await?
        .ok_or_else(|| BotError::UnknownUser(event.user_id.to_string()))?;

    let Some(node) = user.node.clone() else {
        send(bot, user.telegram_id, get_text(lang, "node.not_registered")).await;
        return Err(BotError::NoNode);
    };
    let wallet = user.wallet.as_ref().ok_or(BotError::NoWallet)?;

    notify_invoice_received(bot, state, event).await;

    let node_invoice = state
        .nodes
        .get_invoice(&node, event.invoice.amount, &event.invoice.memo)
        .await?;
    send(bot, user.telegram_id, relay_status(lang, &node_invoice)).await;

    state.lnbits.pay(wallet, &node_invoice.payment_request).await?;
    info!(
        "Relayed {} sat of user {} to {}",
        event.invoice.amount, user.telegram_id, node.host
    );
    node_invoices(state).insert(user.telegram_id, node_invoice.clone());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let checked = state.nodes.check_invoice(&node, &node_invoice).await?;
    node_invoices(state).insert(user.telegram_id, checked.clone());
    send(bot, user.telegram_id, relay_status(lang, &checked)).await;

    if let Err(e) = wallet::refresh_balance(state, &user).await {
        warn!("Could not refresh balance of {}: {}", user.telegram_id, e);
    }
    Ok(())
}

fn relay_status(lang: &str, invoice: &crate::node::NodeInvoice) -> String {
    get_text_with(
        lang,
        "node.relay_status",
        &[
            ("pr", &html_escape(&invoice.payment_request)),
            ("hash", &html_escape(&invoice.r_hash)),
            ("status", &invoice.status),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Invoice, InvoiceCallback};

    fn event(chat_id: i64, message_id: Option<i32>) -> InvoiceEvent {
        InvoiceEvent::new(
            Invoice {
                payment_hash: "h".into(),
                payment_request: "lnbc".into(),
                amount: 21,
                memo: String::new(),
            },
            77,
            chat_id,
            InvoiceCallback::Generic,
        )
        .with_message(message_id)
    }

    #[test]
    fn test_notice_replies_to_invoice_message() {
        let (chat_id, reply_to) = notice_target(&event(77, Some(12)));
        assert_eq!(chat_id, ChatId(77));
        let reply_to = reply_to.unwrap();
        assert_eq!(reply_to.message_id, MessageId(12));
        assert_eq!(reply_to.allow_sending_without_reply, Some(true));
    }

    #[test]
    fn test_notice_without_message_goes_to_private_chat() {
        let (chat_id, reply_to) = notice_target(&event(-100, None));
        assert_eq!(chat_id, ChatId(77));
        assert!(reply_to.is_none());
    }
}
