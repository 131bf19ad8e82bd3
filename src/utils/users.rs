//! Display strings for Telegram users.

use teloxide::types::User;

use super::html_escape;
use crate::database::WalletUser;

/// Name parts needed to render a user.
pub trait DisplayName {
    fn tg_id(&self) -> u64;
    fn tg_username(&self) -> Option<&str>;
    fn tg_first_name(&self) -> &str;
}

impl DisplayName for User {
    fn tg_id(&self) -> u64 {
        self.id.0
    }
    fn tg_username(&self) -> Option<&str> {
        self.username.as_deref()
    }
    fn tg_first_name(&self) -> &str {
        &self.first_name
    }
}

impl DisplayName for WalletUser {
    fn tg_id(&self) -> u64 {
        self.telegram_id
    }
    fn tg_username(&self) -> Option<&str> {
        self.username_display.as_deref().or(self.username.as_deref())
    }
    fn tg_first_name(&self) -> &str {
        &self.first_name
    }
}

/// `@username`, else the first name, else the numeric id.
pub fn user_str(user: &impl DisplayName) -> String {
    match user.tg_username().filter(|u| !u.is_empty()) {
        Some(username) => format!("@{}", username),
        None if !user.tg_first_name().is_empty() => user.tg_first_name().to_string(),
        None => user.tg_id().to_string(),
    }
}

/// HTML mention: `@username`, or a `tg://user` link on the first name or id.
pub fn user_mention(user: &impl DisplayName) -> String {
    if let Some(username) = user.tg_username().filter(|u| !u.is_empty()) {
        return html_escape(&format!("@{}", username));
    }

    let label = if user.tg_first_name().is_empty() {
        user.tg_id().to_string()
    } else {
        html_escape(user.tg_first_name())
    };
    format!("<a href=\"tg://user?id={}\">{}</a>", user.tg_id(), label)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        id: u64,
        username: &'static str,
        first_name: &'static str,
    }

    impl DisplayName for Named {
        fn tg_id(&self) -> u64 {
            self.id
        }
        fn tg_username(&self) -> Option<&str> {
            Some(self.username)
        }
        fn tg_first_name(&self) -> &str {
            self.first_name
        }
    }

    fn named(username: &'static str, first_name: &'static str) -> Named {
        Named {
            id: 12351241,
            username,
            first_name,
        }
    }

    #[test]
    fn test_user_str() {
        assert_eq!(user_str(&named("", "BotUser")), "BotUser");
        assert_eq!(user_str(&named("Username", "BotUser")), "@Username");
        assert_eq!(user_str(&named("", "")), "12351241");
        assert_eq!(user_str(&named("Username", "")), "@Username");
    }

    #[test]
    fn test_user_mention() {
        assert_eq!(
            user_mention(&named("", "BotUser")),
            "<a href=\"tg://user?id=12351241\">BotUser</a>"
        );
        assert_eq!(user_mention(&named("Username", "BotUser")), "@Username");
        assert_eq!(
            user_mention(&named("", "")),
            "<a href=\"tg://user?id=12351241\">12351241</a>"
        );
        assert_eq!(
            user_mention(&named("", "<Bob>")),
            "<a href=\"tg://user?id=12351241\">&lt;Bob&gt;</a>"
        );
    }
}
