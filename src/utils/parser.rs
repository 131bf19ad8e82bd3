//! Command argument parsing.

use crate::errors::BotError;

/// Largest amount accepted in a command, in sat.
pub const MAX_AMOUNT: i64 = 21_000_000 * 100_000_000;

/// Word `index` of `text`, split on whitespace (0 is the command).
pub fn argument(text: &str, index: usize) -> Option<&str> {
    text.split_whitespace().nth(index)
}

/// Everything after the first `skip` words, untouched.
pub fn rest_after(text: &str, skip: usize) -> Option<&str> {
    let mut rest = text.trim_start();
    for _ in 0..skip {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    (!rest.is_empty()).then_some(rest)
}

/// Parse a positive sat amount. `2k` and `1.5k` mean thousands.
pub fn parse_amount(input: &str) -> Result<i64, BotError> {
    let input = input.trim().to_lowercase();

    let amount = match input.strip_suffix('k') {
        Some(thousands) => {
            let value: f64 = thousands.parse().map_err(|_| BotError::InvalidAmount)?;
            if !value.is_finite() {
                return Err(BotError::InvalidAmount);
            }
            (value * 1000.0).round() as i64
        }
        None => input.parse().map_err(|_| BotError::InvalidAmount)?,
    };

    if !(1..=MAX_AMOUNT).contains(&amount) {
        return Err(BotError::InvalidAmount);
    }
    Ok(amount)
}

/// Cut `text` to `max` chars, appending `...` when something was cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str("...");
    cut
}

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("100").unwrap(), 100);
        assert_eq!(parse_amount("2k").unwrap(), 2000);
        assert_eq!(parse_amount("1.5K").unwrap(), 1500);
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("").is_err());
        assert!(parse_amount("nank").is_err());
    }

    #[test]
    fn test_arguments() {
        let text = "/tip  100   thanks for   the coffee";
        assert_eq!(argument(text, 1), Some("100"));
        assert_eq!(argument(text, 9), None);
        assert_eq!(rest_after(text, 2), Some("thanks for   the coffee"));
        assert_eq!(rest_after("/tip 100", 2), None);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("⚡⚡⚡⚡", 2), "⚡⚡...");
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<b>&</b>"), "&lt;b&gt;&amp;&lt;/b&gt;");
    }
}
