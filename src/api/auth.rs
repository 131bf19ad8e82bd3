//! Wallet key authentication.
//!
//! `Authorization: Basic <credentials>` where the credentials are either
//! the raw wallet key or base64 of `user:key`. The admin key unlocks every
//! route; the invoice key everything but paying.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, warn};

use super::error::ApiError;
use super::ApiState;
use crate::database::{is_banned_key, WalletUser};
use crate::utils::user_str;

/// What a wallet key unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAccess {
    /// Admin key: every route.
    Admin,
    /// Invoice key: everything but paying.
    Invoice,
}

impl KeyAccess {
    pub fn can_pay(self) -> bool {
        self == KeyAccess::Admin
    }
}

/// Authenticated caller, stored in the request extensions.
#[derive(Debug, Clone)]
pub struct ApiUser {
    pub user: WalletUser,
    pub access: KeyAccess,
}

/// Access `key` grants on `user`'s wallet. `None` for banned users and
/// keys, and for keys that aren't this wallet's.
pub fn key_access(user: &WalletUser, key: &str) -> Option<KeyAccess> {
    if is_banned_key(key) || user.is_banned() {
        return None;
    }
    let wallet = user.wallet.as_ref()?;
    if wallet.adminkey.eq_ignore_ascii_case(key) {
        Some(KeyAccess::Admin)
    } else if wallet.inkey.eq_ignore_ascii_case(key) {
        Some(KeyAccess::Invoice)
    } else {
        None
    }
}

/// Wallet key from an `Authorization` header value.
pub fn parse_auth(header: &str) -> Option<String> {
    const PREFIX: &str = "basic ";
    let scheme = header.get(..PREFIX.len())?;
    if !scheme.eq_ignore_ascii_case(PREFIX) {
        return None;
    }
    let credentials = header[PREFIX.len()..].trim();
    if credentials.is_empty() {
        return None;
    }

    let decoded = BASE64
        .decode(credentials)
        .ok()
        .and_then(|raw| String::from_utf8(raw).ok())
        .and_then(|text| text.split_once(':').map(|(_, key)| key.to_string()));

    Some(decoded.unwrap_or_else(|| credentials.to_string()))
}

pub async fn authorize(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(parse_auth)
        .ok_or(ApiError::Unauthorized)?;

    if is_banned_key(&key) {
        warn!("Banned key, not forwarding request");
        return Err(ApiError::Unauthorized);
    }

    let user = state
        .app
        .users
        .get_by_wallet_key(&key)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::Unauthorized)?;

    let Some(access) = key_access(&user, &key) else {
        warn!("Key of {} grants no access", user_str(&user));
        return Err(ApiError::Unauthorized);
    };
    debug!("Loaded API user {} ({:?} key)", user_str(&user), access);

    request.extensions_mut().insert(ApiUser { user, access });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Wallet;

    fn user(adminkey: &str, inkey: &str) -> WalletUser {
        WalletUser {
            telegram_id: 11,
            username: Some("alice".into()),
            username_display: Some("Alice".into()),
            first_name: "Alice".into(),
            language_code: None,
            lnbits_id: Some("u11".into()),
            wallet: Some(Wallet {
                id: "w11".into(),
                name: "11".into(),
                adminkey: adminkey.into(),
                inkey: inkey.into(),
            }),
            initialized: true,
            node: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_admin_key_may_pay() {
        let alice = user("adm1n0key", "1nv0ice");
        assert_eq!(key_access(&alice, "adm1n0key"), Some(KeyAccess::Admin));
        assert_eq!(key_access(&alice, "ADM1N0KEY"), Some(KeyAccess::Admin));
        assert!(KeyAccess::Admin.can_pay());
    }

    #[test]
    fn test_invoice_key_may_not_pay() {
        let alice = user("adm1n0key", "1nv0ice");
        let access = key_access(&alice, "1nv0ice");
        assert_eq!(access, Some(KeyAccess::Invoice));
        assert!(!access.unwrap().can_pay());
    }

    #[test]
    fn test_banned_or_foreign_keys_get_nothing() {
        let alice = user("adm1n0key", "1nv0ice");
        assert_eq!(key_access(&alice, "0ther"), None);
        assert_eq!(key_access(&alice, "banned_adm1n0key"), None);

        let banned = user("banned_adm1n0key", "1nv0ice");
        assert_eq!(key_access(&banned, "1nv0ice"), None);
    }

    #[test]
    fn test_raw_key() {
        assert_eq!(parse_auth("Basic abc123").as_deref(), Some("abc123"));
        assert_eq!(parse_auth("basic abc123").as_deref(), Some("abc123"));
    }

    #[test]
    fn test_base64_user_and_key() {
        let header = format!("Basic {}", BASE64.encode("alice:secretkey"));
        assert_eq!(parse_auth(&header).as_deref(), Some("secretkey"));
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert_eq!(parse_auth("Bearer abc"), None);
        assert_eq!(parse_auth("Basic "), None);
        assert_eq!(parse_auth(""), None);
    }

    #[test]
    fn test_banned_keys() {
        assert!(is_banned_key("banned_abc"));
        assert!(is_banned_key("abc_def"));
        assert!(!is_banned_key("0123abcd"));
    }
}
