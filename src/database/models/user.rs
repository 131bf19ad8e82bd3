//! Wallet user model.

use serde::{Deserialize, Serialize};
use teloxide::types::User;

/// LNbits wallet credentials of one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub name: String,
    /// Admin key; may spend.
    pub adminkey: String,
    /// Invoice/read key.
    pub inkey: String,
}

/// Connection parameters of a user's own LND node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LndParams {
    /// `https://host:port` of the LND REST interface.
    pub host: String,
    /// Hex or base64 encoded macaroon as the user entered it.
    pub macaroon: String,
    /// PEM root certificate; empty means "don't verify".
    #[serde(default)]
    pub cert: String,
}

/// A Telegram user together with their wallet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletUser {
    pub telegram_id: u64,
    /// Lowercase username for lookups.
    pub username: Option<String>,
    /// Username as Telegram reports it.
    pub username_display: Option<String>,
    pub first_name: String,
    #[serde(default)]
    pub language_code: Option<String>,

    /// LNbits user id.
    #[serde(default)]
    pub lnbits_id: Option<String>,
    #[serde(default)]
    pub wallet: Option<Wallet>,
    /// Set once the user has run `/start` themselves.
    #[serde(default)]
    pub initialized: bool,
    #[serde(default)]
    pub node: Option<LndParams>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl WalletUser {
    pub fn from_telegram(user: &User) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            telegram_id: user.id.0,
            username: user.username.as_ref().map(|u| u.to_lowercase()),
            username_display: user.username.clone(),
            first_name: user.first_name.clone(),
            language_code: user.language_code.clone(),
            lnbits_id: None,
            wallet: None,
            initialized: false,
            node: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the Telegram profile differs from what we stored.
    pub fn has_changed(&self, other: &User) -> bool {
        let new_username = other.username.as_ref().map(|u| u.to_lowercase());
        self.username != new_username
            || self.first_name != other.first_name
            || self.language_code != other.language_code
    }

    /// Copy the Telegram profile fields over, keeping wallet data.
    pub fn refresh_profile(&mut self, user: &User) {
        self.username = user.username.as_ref().map(|u| u.to_lowercase());
        self.username_display = user.username.clone();
        self.first_name = user.first_name.clone();
        self.language_code = user.language_code.clone();
        self.updated_at = chrono::Utc::now().timestamp();
    }

    /// Banned wallets have their admin key rewritten to `banned...` or to
    /// something containing `_`.
    pub fn is_banned(&self) -> bool {
        self.wallet
            .as_ref()
            .is_some_and(|w| is_banned_key(&w.adminkey))
    }

    pub fn has_wallet(&self) -> bool {
        self.wallet.is_some()
    }
}

/// Whether a wallet key belongs to a banned wallet.
pub fn is_banned_key(key: &str) -> bool {
    key.starts_with("banned") || key.contains('_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_key(adminkey: &str) -> WalletUser {
        WalletUser {
            telegram_id: 1,
            username: None,
            username_display: None,
            first_name: "Alice".into(),
            language_code: None,
            lnbits_id: Some("u1".into()),
            wallet: Some(Wallet {
                id: "w1".into(),
                name: "1".into(),
                adminkey: adminkey.into(),
                inkey: "inkey".into(),
            }),
            initialized: true,
            node: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_banned_keys() {
        assert!(!user_with_key("3f1c0e9a").is_banned());
        assert!(user_with_key("banned3f1c0e9a").is_banned());
        assert!(user_with_key("3f1c_0e9a").is_banned());
    }

    #[test]
    fn test_user_without_wallet_is_not_banned() {
        let mut user = user_with_key("x");
        user.wallet = None;
        assert!(!user.is_banned());
    }
}
