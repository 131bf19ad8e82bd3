//! /tip (aliases /t and /honk): reply to a message to tip its author.

use teloxide::prelude::*;
use tracing::{debug, info, warn};

use crate::bot::interceptors::{load_reply_to, lock, log_message, require_user, unlock};
use crate::database::{TransactionType, WalletUser};
use crate::errors::{BotError, BotResult};
use crate::i18n;
use crate::intercept::{Endpoint, HandlerRegistry, LogFields, Pipeline, Step, UpdateContext};
use crate::utils::{argument, html_escape, parse_amount, rest_after, truncate, user_mention, user_str};
use crate::wallet::{self, Transfer};

const MAX_TIP_MEMO: usize = 200;

pub fn register(registry: &mut HandlerRegistry<UpdateContext>) {
    registry.register(
        &[
            Endpoint::command("tip"),
            Endpoint::command("t"),
            Endpoint::command("honk"),
        ],
        Pipeline::new(tip_handler)
            .before(lock)
            .before(require_user)
            .before(load_reply_to)
            .before(log_message)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "tipHandler", "/tip")),
    );
}

async fn tip_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = tip(&ctx).await;
    ctx.finish(result)
}

async fn tip(ctx: &UpdateContext) -> BotResult<()> {
    let from = ctx.require_user()?;
    let message = ctx.message().ok_or(BotError::NoSender)?;
    let to = ctx.reply_to.clone().ok_or(BotError::NoReply)?;

    let amount = parse_amount(argument(ctx.text(), 1).ok_or(BotError::InvalidSyntax)?)?;
    if from.telegram_id == to.telegram_id {
        return Err(BotError::SelfTip);
    }

    let to = if to.has_wallet() {
        to
    } else {
        info!("{} has no wallet yet, creating one", user_str(&to));
        wallet::create_wallet(&ctx.state, to).await?
    };

    let memo = rest_after(ctx.text(), 2).map(|m| truncate(m, MAX_TIP_MEMO));
    let tx = Transfer {
        from,
        to: &to,
        amount,
        memo: format!("🏅 Tip from {} to {}.", user_str(from), user_str(&to)),
        kind: TransactionType::Tip,
        chat_id: message.chat.id.0,
        chat_name: message.chat.title().map(str::to_string),
    }
    .send(&ctx.state)
    .await?;
    info!("Tip {} from {} to {}: {} sat", tx.id, tx.from_user, tx.to_user, amount);

    let amount = amount.to_string();
    ctx.send_to_user(
        from.telegram_id,
        ctx.t_with("tip.sent", &[("amount", &amount), ("user", &user_mention(&to))]),
    )
    .await?;

    if let Some(replied) = message.reply_to_message()
        && let Err(e) = ctx
            .bot
            .forward_message(UserId(to.telegram_id), replied.chat.id, replied.id)
            .disable_notification(true)
            .await
    {
        debug!("Could not forward tipped message: {}", e);
    }

    notify_receiver(ctx, from, &to, &amount, memo.as_deref()).await;
    Ok(())
}

/// Tell the receiver about the tip in their own language. Receivers that
/// never talked to the bot can't be messaged; that's not an error.
pub async fn notify_receiver(
    ctx: &UpdateContext,
    from: &WalletUser,
    to: &WalletUser,
    amount: &str,
    memo: Option<&str>,
) {
    let lang = i18n::resolve_locale(to.language_code.as_deref());
    let text = i18n::get_text_with(
        &lang,
        "tip.received",
        &[("user", &user_mention(from)), ("amount", amount)],
    );
    if let Err(e) = ctx.send_to_user(to.telegram_id, text).await {
        warn!("Could not notify {}: {}", user_str(to), e);
        return;
    }

    if let Some(memo) = memo {
        let text = format!("✉️ {}", html_escape(memo));
        if let Err(e) = ctx.send_to_user(to.telegram_id, text).await {
            debug!("Could not relay memo to {}: {}", user_str(to), e);
        }
    }
}
