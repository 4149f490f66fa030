//! Tool argument sanitization
//!
//! Runs on the raw argument tree before validation.

use serde_json::{Map, Value};

/// Characters removed from every string value
pub const STRIPPED_CHARS: &[char] = &['<', '>', '"', '\'', '`'];

/// Sanitize an argument tree.
///
/// Strips `STRIPPED_CHARS` from every string and drops object keys that start
/// with `$` or contain `__proto__`, at any depth.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !is_blocked_key(key))
                .map(|(key, v)| (key, sanitize(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

fn sanitize_str(s: &str) -> String {
    s.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect()
}

fn is_blocked_key(key: &str) -> bool {
    key.starts_with('$') || key.contains("__proto__")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strips_markup_characters() {
        let cleaned = sanitize(json!({"question": "<script>'"}));
        assert_eq!(cleaned, json!({"question": "script"}));

        let cleaned = sanitize(json!("say \"hi\" with `code` and it's <b>"));
        assert_eq!(cleaned, json!("say hi with code and its b"));
    }

    #[test]
    fn test_drops_polluting_keys_at_any_depth() {
        let cleaned = sanitize(json!({
            "$where": "1 == 1",
            "__proto__": {"admin": true},
            "constructor__proto__x": 1,
            "messages": [
                {"role": "user", "content": "hi", "$set": "x"}
            ],
            "nested": {"a__proto__": 1, "ok": "<fine>"}
        }));

        assert_eq!(
            cleaned,
            json!({
                "messages": [{"role": "user", "content": "hi"}],
                "nested": {"ok": "fine"}
            })
        );
    }

    #[test]
    fn test_non_string_values_pass_through() {
        let input = json!({"max_results": 3.7, "include_news": true, "context": null});
        assert_eq!(sanitize(input.clone()), input);
    }
}
