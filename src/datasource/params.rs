//! Parameter helpers: placeholder substitution, coercion, extraction.

use std::collections::HashMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Number, Value};

use crate::config::schema::ValueType;

/// Characters left alone by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const PLACEHOLDER_PREFIX: &str = "{params.";

/// Replace `{params.NAME}` with the JSON-escaped value of `params[NAME]`.
///
/// Placeholders without a matching param are left untouched.
pub fn substitute_placeholders(template: &str, params: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(PLACEHOLDER_PREFIX) {
        out.push_str(&rest[..start]);
        let after = &rest[start + PLACEHOLDER_PREFIX.len()..];
        match after.find('}') {
            Some(end) if is_name(&after[..end]) => {
                let name = &after[..end];
                match params.get(name) {
                    Some(value) => out.push_str(&json_escape(value)),
                    None => out.push_str(&rest[start..start + PLACEHOLDER_PREFIX.len() + end + 1]),
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str(PLACEHOLDER_PREFIX);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Escape a value for embedding inside a JSON string literal.
fn json_escape(value: &str) -> String {
    let quoted = Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Parse `raw` as a JSON number.
pub fn to_number(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::Number(n.into()));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Apply a declared type to a request value. `None` means the value is not numeric.
pub fn coerce(raw: &str, kind: Option<ValueType>) -> Option<Value> {
    match kind {
        Some(ValueType::Number) => to_number(raw),
        Some(ValueType::String) | None => Some(Value::String(raw.to_string())),
    }
}

/// Percent-encode like `encodeURIComponent`.
pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

/// Follow a dotted path (`results.0.id`) through objects and arrays.
pub fn extract_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            Value::Object(map) => map.get(segment),
            _ => None,
        })
}

/// Render a scalar for string substitution (strings without quotes).
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
