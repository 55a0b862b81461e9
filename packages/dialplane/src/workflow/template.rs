//! `{{dotted.path}}` substitution over action config strings.
//!
//! Values are inserted verbatim; this is a substitutor, not an expression
//! language. Unknown paths render as the empty string.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::conditions::lookup_path;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").unwrap());

/// Substitute placeholders in one string.
pub fn interpolate(template: &str, payload: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match lookup_path(payload, &caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

/// Walk an action config and substitute inside every string leaf.
pub fn interpolate_value(config: &Value, payload: &Value) -> Value {
    match config {
        Value::String(s) => Value::String(interpolate(s, payload)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_value(item, payload))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, payload)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_paths_and_leaves_text() {
        let payload = json!({
            "duration_secs": 95,
            "agent": {"name": "Receptionist"},
            "summary": "caller booked"
        });
        assert_eq!(
            interpolate("{{agent.name}} finished in {{duration_secs}}s: {{summary}}", &payload),
            "Receptionist finished in 95s: caller booked"
        );
    }

    #[test]
    fn unknown_paths_become_empty() {
        let payload = json!({});
        assert_eq!(interpolate("x={{missing.path}}!", &payload), "x=!");
    }

    #[test]
    fn whitespace_inside_braces_is_tolerated() {
        let payload = json!({"status": "completed"});
        assert_eq!(interpolate("{{ status }}", &payload), "completed");
    }

    #[test]
    fn nested_config_interpolation() {
        let payload = json!({"id": "call-1", "score": 8});
        let config = json!({
            "url": "https://hooks.example.com/call/{{id}}",
            "body": {"score": "{{score}}", "fixed": 1},
            "tags": ["call-{{id}}"]
        });
        let out = interpolate_value(&config, &payload);
        assert_eq!(out["url"], "https://hooks.example.com/call/call-1");
        assert_eq!(out["body"]["score"], "8");
        assert_eq!(out["body"]["fixed"], 1);
        assert_eq!(out["tags"][0], "call-call-1");
    }
}
