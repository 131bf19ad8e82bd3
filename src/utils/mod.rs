//! Helpers shared by plugins.

pub mod parser;
pub mod users;

pub use parser::{argument, html_escape, parse_amount, rest_after, truncate};
pub use users::{user_mention, user_str};
