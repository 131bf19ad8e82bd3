//! Error taxonomy for the bot.
//!
//! Every failure that can travel through the interceptor pipeline is a
//! [`BotError`]. The [`ErrorKind`] tells the caller how to treat it:
//! user-facing errors get a localized chat reply, upstream errors are
//! logged, transient errors are retried by the settlement ticker.

use thiserror::Error;

use crate::lnbits::WalletError;
use crate::node::NodeError;

/// Broad classification of a [`BotError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad syntax, invalid amount, self-tip and friends.
    UserInput,
    /// Banned user or missing wallet.
    Authorization,
    /// Wallet service, node, Telegram or database failure.
    Upstream,
    /// Settlement not observed yet.
    Transient,
    /// Bugs and everything else.
    Internal,
}

#[derive(Debug, Error)]
pub enum BotError {
    #[error("invalid syntax")]
    InvalidSyntax,

    #[error("invalid amount")]
    InvalidAmount,

    #[error("cannot tip yourself")]
    SelfTip,

    #[error("message is not a reply")]
    NoReply,

    #[error("command is only available in a private chat")]
    NoPrivateChat,

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("update has no sender")]
    NoSender,

    #[error("user has no wallet")]
    NoWallet,

    #[error("user is banned")]
    Banned,

    #[error("balance too low")]
    InsufficientBalance,

    #[error("no node registered")]
    NoNode,

    #[error("payment request expired or unknown")]
    PaymentExpired,

    #[error("invoice not settled yet")]
    NotSettled,

    #[error("wallet service: {0}")]
    Wallet(#[from] WalletError),

    #[error("node: {0}")]
    Node(#[from] NodeError),

    #[error("telegram: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("storage: {0}")]
    Storage(#[from] mongodb::error::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BotError::InvalidSyntax
            | BotError::InvalidAmount
            | BotError::SelfTip
            | BotError::NoReply
            | BotError::NoPrivateChat
            | BotError::UnknownUser(_)
            | BotError::NoNode
            | BotError::PaymentExpired => ErrorKind::UserInput,
            BotError::NoSender | BotError::NoWallet | BotError::Banned => {
                ErrorKind::Authorization
            }
            BotError::InsufficientBalance
            | BotError::Wallet(_)
            | BotError::Node(_)
            | BotError::Telegram(_)
            | BotError::Storage(_) => ErrorKind::Upstream,
            BotError::NotSettled => ErrorKind::Transient,
            BotError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Translation key of the chat reply for this error, if the user
    /// should be told about it.
    pub fn user_message_key(&self) -> Option<&'static str> {
        let key = match self {
            BotError::InvalidSyntax => "errors.invalid_syntax",
            BotError::InvalidAmount => "errors.invalid_amount",
            BotError::SelfTip => "errors.self_tip",
            BotError::NoReply => "errors.no_reply",
            BotError::NoPrivateChat => "errors.private_only",
            BotError::UnknownUser(_) => "errors.unknown_user",
            BotError::NoWallet => "errors.no_wallet",
            BotError::InsufficientBalance => "errors.balance_too_low",
            BotError::NoNode => "node.not_registered",
            BotError::PaymentExpired => "pay.expired",
            BotError::NotSettled => "node.not_settled",
            BotError::Wallet(_) | BotError::Node(_) | BotError::Other(_) => "errors.try_later",
            // Banned users get silence, Telegram errors can't be reported
            // over Telegram anyway.
            BotError::NoSender
            | BotError::Banned
            | BotError::Telegram(_)
            | BotError::Storage(_) => return None,
        };
        Some(key)
    }
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(BotError::SelfTip.kind(), ErrorKind::UserInput);
        assert_eq!(BotError::Banned.kind(), ErrorKind::Authorization);
        assert_eq!(BotError::NotSettled.kind(), ErrorKind::Transient);
        assert_eq!(
            BotError::Wallet(WalletError::Api { status: 500, body: String::new() }).kind(),
            ErrorKind::Upstream
        );
    }

    #[test]
    fn test_banned_users_get_no_reply() {
        assert_eq!(BotError::Banned.user_message_key(), None);
        assert_eq!(BotError::InvalidAmount.user_message_key(), Some("errors.invalid_amount"));
    }
}
