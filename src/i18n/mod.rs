//! Translations.
//!
//! Strings are embedded JSON, one file per language, addressed by dotted
//! keys like `tip.sent`. Placeholders are written `{name}`.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::Value;
use tracing::warn;

pub const DEFAULT_LOCALE: &str = "en";

static TRANSLATIONS: OnceLock<HashMap<&'static str, Value>> = OnceLock::new();

fn translations() -> &'static HashMap<&'static str, Value> {
    TRANSLATIONS.get_or_init(|| {
        let mut map = HashMap::new();
        for (lang, raw) in [("en", include_str!("en.json")), ("de", include_str!("de.json"))] {
            match serde_json::from_str(raw) {
                Ok(value) => {
                    map.insert(lang, value);
                }
                Err(e) => warn!("Broken translation file {}: {}", lang, e),
            }
        }
        map
    })
}

/// Text for `key` in `lang`, falling back to English and then to the key
/// itself.
pub fn get_text(lang: &str, key: &str) -> String {
    let store = translations();
    store
        .get(lang)
        .and_then(|v| resolve_key(v, key))
        .or_else(|| store.get(DEFAULT_LOCALE).and_then(|v| resolve_key(v, key)))
        .unwrap_or_else(|| key.to_string())
}

/// [`get_text`] with `{name}` placeholders filled in.
pub fn get_text_with(lang: &str, key: &str, args: &[(&str, &str)]) -> String {
    fill(&get_text(lang, key), args)
}

/// Replace placeholders in one pass over `template`. Substituted values are
/// never scanned again, so a name like `{amount}` stays literal. Unknown
/// placeholders are kept.
fn fill(template: &str, args: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after
            .find('}')
            .and_then(|close| {
                let name = &after[..close];
                args.iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, value)| (*value, close))
            });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_key(val: &Value, key: &str) -> Option<String> {
    let mut current = val;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    current.as_str().map(str::to_string)
}

/// Supported locale for a Telegram language code (`de-AT` -> `de`).
pub fn resolve_locale(language_code: Option<&str>) -> String {
    let Some(code) = language_code else {
        return DEFAULT_LOCALE.to_string();
    };
    let base = code.split(['-', '_']).next().unwrap_or(code).to_lowercase();
    if translations().contains_key(base.as_str()) {
        base
    } else {
        DEFAULT_LOCALE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallbacks() {
        assert_eq!(get_text("de", "missing.key"), "missing.key");
        assert_eq!(get_text("xx", "help.title"), get_text("en", "help.title"));
        assert_ne!(get_text("de", "help.title"), "help.title");
    }

    #[test]
    fn test_placeholders() {
        let text = get_text_with("en", "balance.show", &[("amount", "2100")]);
        assert!(text.contains("2100"));
        assert!(!text.contains("{amount}"));
    }

    #[test]
    fn test_values_are_not_substituted_again() {
        let text = fill("{user} sent {amount} sat", &[("user", "{amount}"), ("amount", "21")]);
        assert_eq!(text, "{amount} sent 21 sat");
    }

    #[test]
    fn test_unknown_and_unclosed_placeholders_stay() {
        assert_eq!(fill("{who} got {amount", &[("amount", "5")]), "{who} got {amount");
        assert_eq!(fill("{}", &[]), "{}");
    }

    #[test]
    fn test_resolve_locale() {
        assert_eq!(resolve_locale(Some("de-AT")), "de");
        assert_eq!(resolve_locale(Some("DE")), "de");
        assert_eq!(resolve_locale(Some("fr")), "en");
        assert_eq!(resolve_locale(None), "en");
    }

    #[test]
    fn test_every_english_key_has_german_text() {
        fn leaves(prefix: &str, v: &Value, out: &mut Vec<String>) {
            if let Some(obj) = v.as_object() {
                for (k, child) in obj {
                    let key = if prefix.is_empty() { k.clone() } else { format!("{}.{}", prefix, k) };
                    leaves(&key, child, out);
                }
            } else {
                out.push(prefix.to_string());
            }
        }

        let store = translations();
        let mut keys = Vec::new();
        leaves("", &store["en"], &mut keys);
        for key in keys {
            assert!(resolve_key(&store["de"], &key).is_some(), "de is missing {}", key);
        }
    }
}
