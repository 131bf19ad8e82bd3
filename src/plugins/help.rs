//! /help and /info.

use crate::errors::{BotError, BotResult};
use crate::intercept::{Endpoint, HandlerRegistry, LogFields, Pipeline, Step, UpdateContext};

pub fn register(registry: &mut HandlerRegistry<UpdateContext>) {
    registry.register(
        &[Endpoint::command("help")],
        Pipeline::new(help_handler).fields(LogFields::new("telegram", "helpHandler", "/help")),
    );
    registry.register(
        &[Endpoint::command("info")],
        Pipeline::new(info_handler).fields(LogFields::new("telegram", "infoHandler", "/info")),
    );
}

/// Command overview in the context's language.
pub fn help_text(ctx: &UpdateContext) -> String {
    format!("{}\n\n{}", ctx.t("help.title"), ctx.t("help.commands"))
}

async fn help_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = send_private(&ctx, help_text(&ctx)).await;
    ctx.finish(result)
}

async fn info_handler(ctx: UpdateContext) -> Step<UpdateContext> {
    let result = send_private(&ctx, ctx.t("help.info")).await;
    ctx.finish(result)
}

/// Help always goes to the private chat so groups stay quiet.
async fn send_private(ctx: &UpdateContext, text: String) -> BotResult<()> {
    let sender = ctx.sender().ok_or(BotError::NoSender)?;
    ctx.send_to_user(sender.id.0, text).await?;
    Ok(())
}
