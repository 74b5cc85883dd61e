//! `${path.to.value}` variable resolution against a run context.
//!
//! Resolution never fails: a reference that cannot be followed is left in the
//! output verbatim, so a handler can later report it as a missing dependency.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("token pattern is valid"));

/// Resolve every `${...}` token in `template` against `context`.
///
/// - A string that is exactly one token yields the referenced JSON value
///   unchanged (numbers stay numbers, objects stay objects).
/// - Tokens embedded in longer text are spliced in: strings verbatim, any other
///   value as compact JSON.
/// - Arrays and objects are resolved element-wise; other values pass through.
pub fn resolve(template: &Value, context: &Value) -> Value {
    match template {
        Value::String(text) => resolve_str(text, context),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, context)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| (key.clone(), resolve(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_str(text: &str, context: &Value) -> Value {
    if let Some(caps) = TOKEN_RE.captures(text) {
        let whole = caps.get(0).map(|m| m.as_str());
        if whole == Some(text) {
            if let Some(found) = lookup(context, caps[1].trim()) {
                return found.clone();
            }
            return Value::String(text.to_owned());
        }
    } else {
        return Value::String(text.to_owned());
    }

    let rendered = TOKEN_RE.replace_all(text, |caps: &Captures<'_>| {
        match lookup(context, caps[1].trim()) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_owned(),
        }
    });
    Value::String(rendered.into_owned())
}

/// Walk `root` along a dotted path. Numeric segments index into arrays.
///
/// Returns `None` as soon as a segment is missing.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// True if `value` still carries an unresolved `${...}` reference.
pub fn has_unresolved(value: &Value) -> bool {
    match value {
        Value::String(s) => TOKEN_RE.is_match(s),
        Value::Array(items) => items.iter().any(has_unresolved),
        Value::Object(map) => map.values().any(has_unresolved),
        _ => false,
    }
}
