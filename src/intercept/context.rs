//! Per-update context threaded through the interceptor chain.

use teloxide::payloads::{EditMessageTextSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, LinkPreviewOptions, MessageId, ParseMode, Recipient, User};
use uuid::Uuid;

use super::chain::{step, Step};
use crate::bot::{AppState, ThrottledBot};
use crate::database::WalletUser;
use crate::errors::{BotError, BotResult};
use crate::i18n;
use crate::runtime::UserLockGuard;

/// The Telegram update a pipeline runs for.
#[derive(Debug, Clone)]
pub enum ChatUpdate {
    Message(Message),
    Callback(CallbackQuery),
}

/// Request-scoped state. Interceptors fill in the optional fields.
pub struct UpdateContext {
    pub state: AppState,
    pub bot: ThrottledBot,
    pub update: ChatUpdate,
    pub trace_id: Uuid,
    pub locale: String,
    /// Acting user's wallet record.
    pub user: Option<WalletUser>,
    /// Author of the message being replied to.
    pub reply_to: Option<WalletUser>,
    /// Held until the unlock interceptor runs or the context drops.
    pub lock: Option<UserLockGuard>,
}

impl UpdateContext {
    pub fn new(state: AppState, bot: ThrottledBot, update: ChatUpdate) -> Self {
        Self {
            state,
            bot,
            update,
            trace_id: Uuid::new_v4(),
            locale: i18n::DEFAULT_LOCALE.to_string(),
            user: None,
            reply_to: None,
            lock: None,
        }
    }

    pub fn sender(&self) -> Option<&User> {
        match &self.update {
            ChatUpdate::Message(msg) => msg.from.as_ref(),
            ChatUpdate::Callback(q) => Some(&q.from),
        }
    }

    /// The message itself, or the message carrying the pressed button.
    pub fn message(&self) -> Option<&Message> {
        match &self.update {
            ChatUpdate::Message(msg) => Some(msg),
            ChatUpdate::Callback(q) => q.message.as_ref().and_then(|m| m.regular_message()),
        }
    }

    pub fn callback(&self) -> Option<&CallbackQuery> {
        match &self.update {
            ChatUpdate::Callback(q) => Some(q),
            ChatUpdate::Message(_) => None,
        }
    }

    /// Data after the first `:` of the pressed button.
    pub fn callback_payload(&self) -> Option<&str> {
        self.callback()
            .and_then(|q| q.data.as_deref())
            .and_then(|d| d.split_once(':'))
            .map(|(_, payload)| payload)
    }

    /// Message text, empty for callbacks.
    pub fn text(&self) -> &str {
        match &self.update {
            ChatUpdate::Message(msg) => msg.text().unwrap_or(""),
            ChatUpdate::Callback(_) => "",
        }
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        self.message().map(|m| m.chat.id)
    }

    pub fn is_private(&self) -> bool {
        self.message().is_some_and(|m| m.chat.is_private())
    }

    /// Wallet user loaded by `load_user`, with a wallet.
    pub fn require_user(&self) -> BotResult<&WalletUser> {
        self.user
            .as_ref()
            .filter(|u| u.has_wallet())
            .ok_or(BotError::NoWallet)
    }

    pub fn t(&self, key: &str) -> String {
        i18n::get_text(&self.locale, key)
    }

    pub fn t_with(&self, key: &str, args: &[(&str, &str)]) -> String {
        i18n::get_text_with(&self.locale, key, args)
    }

    /// Send HTML to the chat the update came from.
    pub async fn reply(&self, text: impl Into<String>) -> BotResult<Message> {
        let chat_id = self.chat_id().ok_or(BotError::NoSender)?;
        self.send_html(chat_id, text, None).await
    }

    /// Send HTML to a user's private chat.
    pub async fn send_to_user(&self, telegram_id: u64, text: impl Into<String>) -> BotResult<Message> {
        self.send_html(UserId(telegram_id), text, None).await
    }

    pub async fn send_html(
        &self,
        to: impl Into<Recipient>,
        text: impl Into<String>,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> BotResult<Message> {
        let mut request = self
            .bot
            .send_message(to, text)
            .parse_mode(ParseMode::Html)
            .link_preview_options(no_preview());
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard);
        }
        Ok(request.await?)
    }

    /// Replace the text (and keyboard) of a message the bot sent.
    pub async fn edit_html(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: impl Into<String>,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> BotResult<()> {
        let mut request = self
            .bot
            .edit_message_text(chat_id, message_id, text)
            .parse_mode(ParseMode::Html)
            .link_preview_options(no_preview());
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard);
        }
        request.await?;
        Ok(())
    }

    /// Finish a handler: hand the context back together with `result`.
    pub fn finish(self, result: BotResult<()>) -> Step<Self> {
        step(self, result)
    }
}

fn no_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}
