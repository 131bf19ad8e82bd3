//! /balance

use tracing::info;

use crate::bot::interceptors::{lock, log_message, require_private_chat, require_user, unlock};
use crate::errors::BotResult;
use crate::intercept::{Endpoint, HandlerRegistry, LogFields, Pipeline, Step, UpdateContext};
use crate::utils::user_str;
use crate::wallet;

pub fn register(registry: &mut HandlerRegistry<UpdateContext>) {
    registry.register(
        &[Endpoint::command("balance")],
        Pipeline::new(balance_handler)
            .before(lock)
            .before(require_private_chat)
            .before(require_user)
            .before(log_message)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "balanceHandler", "/balance")),
    );
}

pub fn balance_text(ctx: &UpdateContext, balance: i64) -> String {
    ctx.t_with("balance.show", &[("amount", &balance.to_string())])
}

async fn balance_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = balance(&ctx).await;
    ctx.finish(result)
}

async fn balance(ctx: &UpdateContext) -> BotResult<()> {
    let user = ctx.require_user()?;
    let amount = wallet::refresh_balance(&ctx.state, user).await?;
    info!("Balance of {}: {} sat", user_str(user), amount);

    ctx.send_to_user(user.telegram_id, balance_text(ctx, amount)).await?;
    Ok(())
}
