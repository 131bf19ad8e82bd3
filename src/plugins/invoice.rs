//! /invoice and the "enter amount" prompt.
//!
//! `/invoice` without an amount remembers that the user owes us a number;
//! the next plain text message in the private chat answers it.

use tracing::{debug, info};

use crate::bot::interceptors::{lock, log_message, require_private_chat, require_user, unlock};
use crate::bot::AppState;
use crate::cache::{CacheConfig, TypedCache};
use crate::database::{InvoiceCallback, WalletUser};
use crate::errors::{BotError, BotResult};
use crate::intercept::{Endpoint, HandlerRegistry, LogFields, Pipeline, Step, UpdateContext};
use crate::utils::{argument, html_escape, parse_amount, rest_after, user_str};
use crate::wallet::{self, EventOrigin};

/// Invoice memos longer than this are rejected by some wallets.
const MAX_MEMO: usize = 159;

/// A pending `/invoice` waiting for its amount.
#[derive(Debug, Clone)]
pub struct AmountPrompt {
    pub memo: Option<String>,
}

pub fn register(registry: &mut HandlerRegistry<UpdateContext>) {
    registry.register(
        &[Endpoint::command("invoice")],
        Pipeline::new(invoice_handler)
            .before(lock)
            .before(require_private_chat)
            .before(require_user)
            .before(log_message)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "invoiceHandler", "/invoice")),
    );
    registry.register(
        &[Endpoint::Text],
        Pipeline::new(amount_prompt_handler)
            .before(lock)
            .before(require_private_chat)
            .before(require_user)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "enterAmountHandler", "text")),
    );
}

fn amount_prompts(state: &AppState) -> TypedCache<u64, AmountPrompt> {
    state.cache.get_or_create("amount_prompts", CacheConfig::session())
}

/// Memo with the bot tag, cut so the whole thing fits [`MAX_MEMO`].
pub fn invoice_memo(memo: Option<&str>, bot_username: &str) -> String {
    let Some(memo) = memo.filter(|m| !m.is_empty()) else {
        return format!("Powered by @{}", bot_username);
    };

    let tag = format!(" (@{})", bot_username);
    let room = MAX_MEMO.saturating_sub(tag.chars().count());
    let mut memo: String = memo.chars().take(room).collect();
    memo.push_str(&tag);
    memo
}

async fn invoice_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = invoice(&ctx).await;
    ctx.finish(result)
}

async fn invoice(ctx: &UpdateContext) -> BotResult<()> {
    let user = ctx.require_user()?;
    let text = ctx.text();
    let memo = rest_after(text, 2).map(str::to_string);

    let amount = match argument(text, 1).map(parse_amount) {
        Some(Ok(amount)) => amount,
        _ => {
            debug!("Asking {} for an invoice amount", user_str(user));
            amount_prompts(&ctx.state).insert(user.telegram_id, AmountPrompt { memo });
            ctx.reply(ctx.t("invoice.enter_amount")).await?;
            return Ok(());
        }
    };

    send_invoice(ctx, user, amount, memo.as_deref()).await
}

async fn amount_prompt_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = answer_prompt(&ctx).await;
    ctx.finish(result)
}

async fn answer_prompt(ctx: &UpdateContext) -> BotResult<()> {
    let user = ctx.require_user()?;
    let prompts = amount_prompts(&ctx.state);
    let Some(prompt) = prompts.take(&user.telegram_id) else {
        return Ok(());
    };

    let amount = match parse_amount(ctx.text()) {
        Ok(amount) => amount,
        Err(e) => {
            // Keep asking until the user sends a number or the prompt expires.
            prompts.insert(user.telegram_id, prompt);
            return Err(e);
        }
    };

    send_invoice(ctx, user, amount, prompt.memo.as_deref()).await
}

async fn send_invoice(
    ctx: &UpdateContext,
    user: &WalletUser,
    amount: i64,
    memo: Option<&str>,
) -> BotResult<()> {
    let chat_id = ctx.chat_id().ok_or(BotError::NoSender)?;
    let memo = invoice_memo(memo, &ctx.state.bot_username);

    let creating = ctx.reply(ctx.t("invoice.creating")).await?;
    let event = wallet::create_invoice_with_event(
        &ctx.state,
        user,
        amount,
        &memo,
        InvoiceCallback::Generic,
        EventOrigin {
            chat_id: chat_id.0,
            message_id: Some(creating.id.0),
            language_code: &ctx.locale,
        },
    )
    .await?;

    let text = ctx.t_with(
        "invoice.created",
        &[
            ("amount", &amount.to_string()),
            ("pr", &html_escape(&event.invoice.payment_request)),
        ],
    );
    ctx.edit_html(chat_id, creating.id, text, None).await?;

    info!("Invoice created. User: {}, amount: {} sat", user_str(user), amount);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_memo() {
        assert_eq!(invoice_memo(None, "TipBot"), "Powered by @TipBot");
        assert_eq!(invoice_memo(Some(""), "TipBot"), "Powered by @TipBot");
    }

    #[test]
    fn test_memo_gets_tag() {
        assert_eq!(invoice_memo(Some("coffee"), "TipBot"), "coffee (@TipBot)");
    }

    #[test]
    fn test_long_memo_fits_limit() {
        let long = "x".repeat(500);
        let memo = invoice_memo(Some(&long), "TipBot");
        assert_eq!(memo.chars().count(), MAX_MEMO);
        assert!(memo.ends_with(" (@TipBot)"));
    }
}
