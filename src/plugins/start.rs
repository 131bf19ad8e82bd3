//! /start: create the wallet and say hello.

use tracing::info;

use crate::bot::interceptors::{load_user, lock, log_message, unlock};
use crate::database::WalletUser;
use crate::errors::{BotError, BotResult};
use crate::intercept::{Endpoint, HandlerRegistry, LogFields, Pipeline, Step, UpdateContext};
use crate::plugins::{balance, help};
use crate::utils::user_str;
use crate::wallet;

pub fn register(registry: &mut HandlerRegistry<UpdateContext>) {
    registry.register(
        &[Endpoint::command("start")],
        Pipeline::new(start_handler)
            .before(lock)
            .before(load_user)
            .before(log_message)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "startHandler", "/start")),
    );
}

async fn start_handler(mut ctx: UpdateContext) -> Step<UpdateContext> {
    let result = start(&mut ctx).await;
    ctx.finish(result)
}

async fn start(ctx: &mut UpdateContext) -> BotResult<()> {
    let sender = ctx.sender().cloned().ok_or(BotError::NoSender)?;

    let mut user = match ctx.user.take() {
        Some(user) if user.is_banned() => return Err(BotError::Banned),
        Some(user) => user,
        None => WalletUser::from_telegram(&sender),
    };

    if !user.has_wallet() {
        ctx.send_to_user(sender.id.0, ctx.t("start.creating")).await?;
        user = wallet::create_wallet(&ctx.state, user).await?;
    }
    if !user.initialized {
        user.initialized = true;
        ctx.state.users.save(&user).await?;
        info!("Initialized wallet of {}", user_str(&user));
    }

    ctx.send_to_user(sender.id.0, help::help_text(ctx)).await?;
    let balance = wallet::refresh_balance(&ctx.state, &user).await?;
    ctx.send_to_user(sender.id.0, balance::balance_text(ctx, balance))
        .await?;

    ctx.user = Some(user);
    Ok(())
}
