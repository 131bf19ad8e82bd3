//! Interceptors used by the bot's pipelines.
//!
//! Each one takes the context and gives it back, possibly with a field
//! filled in. Order matters: `lock` goes first in the before chain so that
//! every record loaded after it is read under the user's lock, and `unlock`
//! goes in the defer chain.

use tracing::{debug, info, warn};

use crate::database::WalletUser;
use crate::errors::BotError;
use crate::i18n;
use crate::intercept::{Interrupted, Step, UpdateContext};
use crate::runtime::LockKey;
use crate::utils::user_str;

/// Pick the reply language from the sender's Telegram settings.
pub async fn localizer(mut ctx: UpdateContext) -> Step<UpdateContext> {
    let code = ctx.sender().and_then(|u| u.language_code.clone());
    ctx.locale = i18n::resolve_locale(code.as_deref());
    Ok(ctx)
}

/// Load the sender's wallet record if there is one. Keeps the stored
/// Telegram profile in sync.
pub async fn load_user(mut ctx: UpdateContext) -> Step<UpdateContext> {
    let Some(sender) = ctx.sender().cloned() else {
        return Err(Interrupted::new(ctx, BotError::NoSender));
    };

    let mut user = match ctx.state.users.get(sender.id.0).await {
        Ok(user) => user,
        Err(e) => return Err(Interrupted::new(ctx, e)),
    };

    if let Some(stored) = user.as_mut()
        && stored.has_changed(&sender)
    {
        stored.refresh_profile(&sender);
        if let Err(e) = ctx.state.users.save(stored).await {
            warn!("Could not update profile of {}: {}", sender.id, e);
        }
    }

    ctx.user = user;
    Ok(ctx)
}

/// [`load_user`], then insist on a wallet that isn't banned.
pub async fn require_user(ctx: UpdateContext) -> Step<UpdateContext> {
    let ctx = load_user(ctx).await?;
    match &ctx.user {
        Some(user) if user.is_banned() => {
            debug!("Ignoring banned user {}", user_str(user));
            Err(Interrupted::new(ctx, BotError::Banned))
        }
        Some(user) if user.has_wallet() => Ok(ctx),
        _ => Err(Interrupted::new(ctx, BotError::NoWallet)),
    }
}

/// Load the author of the replied-to message. Users without a record get
/// a wallet-less placeholder; bots are skipped.
pub async fn load_reply_to(mut ctx: UpdateContext) -> Step<UpdateContext> {
    let replied = ctx
        .message()
        .and_then(|m| m.reply_to_message())
        .and_then(|r| r.from.clone())
        .filter(|u| !u.is_bot);

    let Some(replied) = replied else {
        return Ok(ctx);
    };

    match ctx.state.users.get(replied.id.0).await {
        Ok(Some(user)) => ctx.reply_to = Some(user),
        Ok(None) => ctx.reply_to = Some(WalletUser::from_telegram(&replied)),
        Err(e) => return Err(Interrupted::new(ctx, e)),
    }
    Ok(ctx)
}

pub async fn log_message(ctx: UpdateContext) -> Step<UpdateContext> {
    if let (Some(sender), Some(msg)) = (ctx.sender(), ctx.message()) {
        let chat = msg.chat.title().unwrap_or("private");
        info!("[{}] {}: {}", chat, user_str(sender), ctx.text());
    }
    Ok(ctx)
}

pub async fn require_private_chat(ctx: UpdateContext) -> Step<UpdateContext> {
    if ctx.is_private() {
        Ok(ctx)
    } else {
        Err(Interrupted::new(ctx, BotError::NoPrivateChat))
    }
}

/// Stop the button's loading spinner.
pub async fn answer_callback(ctx: UpdateContext) -> Step<UpdateContext> {
    use teloxide::prelude::Requester;

    if let Some(query) = ctx.callback()
        && let Err(e) = ctx.bot.answer_callback_query(query.id.clone()).await
    {
        debug!("Could not answer callback: {}", e);
    }
    Ok(ctx)
}

/// Serialize this user's updates.
pub async fn lock(mut ctx: UpdateContext) -> Step<UpdateContext> {
    let Some(id) = ctx.sender().map(|u| u.id.0) else {
        return Err(Interrupted::new(ctx, BotError::NoSender));
    };
    ctx.lock = Some(ctx.state.locks.acquire(LockKey::user(id)).await);
    Ok(ctx)
}

pub async fn unlock(mut ctx: UpdateContext) -> Step<UpdateContext> {
    ctx.lock = None;
    Ok(ctx)
}
