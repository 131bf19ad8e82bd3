//! /pay: decode a payment request, confirm with a button, pay.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::{info, warn};
use uuid::Uuid;

use crate::bot::interceptors::{
    answer_callback, lock, log_message, require_private_chat, require_user, unlock,
};
use crate::bot::AppState;
use crate::cache::{CacheConfig, TypedCache};
use crate::errors::{BotError, BotResult};
use crate::intercept::{Endpoint, HandlerRegistry, LogFields, Pipeline, Step, UpdateContext};
use crate::utils::{argument, html_escape, truncate, user_str};
use crate::wallet;

/// Payment waiting for the user to press confirm.
#[derive(Debug, Clone)]
pub struct PendingPayment {
    pub user_id: u64,
    pub payment_request: String,
    pub amount: i64,
    pub memo: String,
}

pub fn register(registry: &mut HandlerRegistry<UpdateContext>) {
    registry.register(
        &[Endpoint::command("pay")],
        Pipeline::new(pay_handler)
            .before(lock)
            .before(require_private_chat)
            .before(require_user)
            .before(log_message)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "payHandler", "/pay")),
    );
    registry.register(
        &[Endpoint::callback("pay_confirm")],
        Pipeline::new(confirm_pay_handler)
            .before(lock)
            .before(require_user)
            .before(answer_callback)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "confirmPayHandler", "pay_confirm")),
    );
    registry.register(
        &[Endpoint::callback("pay_cancel")],
        Pipeline::new(cancel_pay_handler)
            .before(lock)
            .before(require_user)
            .before(answer_callback)
            .on_defer(unlock)
            .fields(LogFields::new("telegram", "cancelPaymentHandler", "pay_cancel")),
    );
}

fn pending_payments(state: &AppState) -> TypedCache<String, PendingPayment> {
    state.cache.get_or_create("pending_payments", CacheConfig::session())
}

fn confirm_keyboard(ctx: &UpdateContext, id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(ctx.t("pay.cancel_button"), format!("pay_cancel:{}", id)),
        InlineKeyboardButton::callback(ctx.t("pay.confirm_button"), format!("pay_confirm:{}", id)),
    ]])
}

async fn pay_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = pay(&ctx).await;
    ctx.finish(result)
}

async fn pay(ctx: &UpdateContext) -> BotResult<()> {
    let user = ctx.require_user()?;
    let wallet = user.wallet.as_ref().ok_or(BotError::NoWallet)?;
    let payment_request = argument(ctx.text(), 1)
        .map(|pr| pr.trim_start_matches("lightning:").to_lowercase())
        .ok_or(BotError::InvalidSyntax)?;

    let decoded = ctx.state.lnbits.decode(wallet, &payment_request).await?;
    let amount = decoded.amount_sat();
    if amount < 1 {
        return Err(BotError::InvalidAmount);
    }

    let balance = wallet::refresh_balance(&ctx.state, user).await?;
    if balance < amount {
        warn!("Balance of {} too low: {} < {}", user_str(user), balance, amount);
        return Err(BotError::InsufficientBalance);
    }

    let id = Uuid::new_v4().simple().to_string();
    let memo = truncate(&decoded.description, 200);
    pending_payments(&ctx.state).insert(
        id.clone(),
        PendingPayment {
            user_id: user.telegram_id,
            payment_request,
            amount,
            memo: memo.clone(),
        },
    );

    let mut text = ctx.t_with("pay.confirm", &[("amount", &amount.to_string())]);
    if !memo.is_empty() {
        text.push_str(&format!("\n✉️ <i>{}</i>", html_escape(&memo)));
    }
    let chat_id = ctx.chat_id().ok_or(BotError::NoSender)?;
    ctx.send_html(chat_id, text, Some(confirm_keyboard(ctx, &id)))
        .await?;
    Ok(())
}

/// Pending payment behind the pressed button, if it belongs to the
/// presser. Someone else's button is left alone.
fn claim(ctx: &UpdateContext) -> BotResult<Option<PendingPayment>> {
    let user = ctx.require_user()?;
    let id = ctx.callback_payload().ok_or(BotError::PaymentExpired)?.to_string();
    let pending = pending_payments(&ctx.state);

    match pending.get(&id) {
        None => Err(BotError::PaymentExpired),
        Some(payment) if payment.user_id != user.telegram_id => Ok(None),
        Some(_) => pending.take(&id).map(Some).ok_or(BotError::PaymentExpired),
    }
}

async fn confirm_pay_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = confirm_pay(&ctx).await;
    ctx.finish(result)
}

async fn confirm_pay(ctx: &UpdateContext) -> BotResult<()> {
    let Some(payment) = claim(ctx)? else {
        return Ok(());
    };
    let user = ctx.require_user()?;
    let wallet = user.wallet.as_ref().ok_or(BotError::NoWallet)?;
    let message = ctx.message().ok_or(BotError::PaymentExpired)?;
    let (chat_id, message_id) = (message.chat.id, message.id);

    ctx.edit_html(chat_id, message_id, ctx.t("pay.paying"), None).await?;

    if let Err(e) = ctx.state.lnbits.pay(wallet, &payment.payment_request).await {
        warn!("Payment of {} failed: {}", user_str(user), e);
        ctx.edit_html(chat_id, message_id, ctx.t("pay.failed"), None).await?;
        return Ok(());
    }

    info!("{} paid {} sat", user_str(user), payment.amount);
    wallet::refresh_balance(&ctx.state, user).await?;
    let text = ctx.t_with("pay.success", &[("amount", &payment.amount.to_string())]);
    ctx.edit_html(chat_id, message_id, text, None).await
}

async fn cancel_pay_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = cancel_pay(&ctx).await;
    ctx.finish(result)
}

async fn cancel_pay(ctx: &UpdateContext) -> BotResult<()> {
    if claim(ctx)?.is_none() {
        return Ok(());
    }
    let message = ctx.message().ok_or(BotError::PaymentExpired)?;
    ctx.edit_html(message.chat.id, message.id, ctx.t("pay.cancelled"), None)
        .await
}
