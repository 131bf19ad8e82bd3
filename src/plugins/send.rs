//! /send <amount> <@user> [memo]

use tracing::info;

use crate::bot::interceptors::{lock, log_message, require_user, unlock};
use crate::database::TransactionType;
use crate::errors::{BotError, BotResult};
use crate::intercept::{Endpoint, HandlerRegistry, LogFields, Pipeline, Step, UpdateContext};
use crate::plugins::tip::notify_receiver;
use crate::utils::{argument, parse_amount, rest_after, truncate, user_mention, user_str};
use crate::wallet::{self, Transfer};

pub fn register(registry: &mut HandlerRegistry<UpdateContext>) {
    registry.register(
        &[Endpoint::command("send")],
        Pipeline::new(send_handler)
            .before(lock)
            .before(require_user)
            .before(log_message)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "sendHandler", "/send")),
    );
}

async fn send_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = send(&ctx).await;
    ctx.finish(result)
}

async fn send(ctx: &UpdateContext) -> BotResult<()> {
    let from = ctx.require_user()?;
    let text = ctx.text();

    let amount = parse_amount(argument(text, 1).ok_or(BotError::InvalidSyntax)?)?;
    let username = argument(text, 2)
        .filter(|u| u.starts_with('@') && u.len() > 1)
        .ok_or(BotError::InvalidSyntax)?;

    let to = ctx
        .state
        .users
        .get_by_username(username)
        .await?
        .ok_or_else(|| BotError::UnknownUser(username.to_string()))?;
    if to.telegram_id == from.telegram_id {
        return Err(BotError::SelfTip);
    }
    let to = wallet::create_wallet(&ctx.state, to).await?;

    let memo = rest_after(text, 3).map(|m| truncate(m, 200));
    let transfer_memo = match &memo {
        Some(memo) => format!("💸 Send from {} to {}: {}", user_str(from), user_str(&to), memo),
        None => format!("💸 Send from {} to {}.", user_str(from), user_str(&to)),
    };

    let message = ctx.message().ok_or(BotError::NoSender)?;
    let tx = Transfer {
        from,
        to: &to,
        amount,
        memo: transfer_memo,
        kind: TransactionType::Send,
        chat_id: message.chat.id.0,
        chat_name: message.chat.title().map(str::to_string),
    }
    .send(&ctx.state)
    .await?;
    info!("Send {} from {} to {}: {} sat", tx.id, tx.from_user, tx.to_user, amount);

    let amount = amount.to_string();
    ctx.reply(ctx.t_with("send.sent", &[("amount", &amount), ("user", &user_mention(&to))]))
        .await?;
    notify_receiver(ctx, from, &to, &amount, memo.as_deref()).await;
    Ok(())
}
