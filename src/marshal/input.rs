//! Parameter tree normalization
//!
//! Turns the loosely-typed tree a playbook or script hands us into the shape
//! the remote API expects: keys re-cased, digit-strings coerced to integers,
//! omitted values dropped.

use super::case::KeyCase;
use serde_json::{Map, Number, Value};

/// Values starting with this prefix mark a key the caller wants left out
pub const OMIT_PREFIX: &str = "__omit_";

/// Normalize a parameter tree.
///
/// * sequences keep order and length
/// * mapping entries whose value is a string starting with [`OMIT_PREFIX`]
///   are dropped; every other key is passed through `key_case`
/// * digit-only strings become integers when `coerce_digits` is set
/// * `_<digits>` strings lose the underscore and stay strings
///
/// Two keys that collide after re-casing: the later one wins.
pub fn normalize_input(node: &Value, coerce_digits: bool, key_case: KeyCase) -> Value {
    match node {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| normalize_input(item, coerce_digits, key_case))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                if is_omitted(value) {
                    continue;
                }
                out.insert(
                    key_case.apply(key),
                    normalize_input(value, coerce_digits, key_case),
                );
            }
            Value::Object(out)
        }
        Value::String(s) => normalize_scalar(s, coerce_digits),
        other => other.clone(),
    }
}

fn is_omitted(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.starts_with(OMIT_PREFIX))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn normalize_scalar(s: &str, coerce_digits: bool) -> Value {
    if is_digits(s) {
        if coerce_digits {
            if let Some(number) = parse_integer(s) {
                return Value::Number(number);
            }
        }
        return Value::String(s.to_string());
    }

    match s.strip_prefix('_') {
        Some(rest) if is_digits(rest) => Value::String(rest.to_string()),
        _ => Value::String(s.to_string()),
    }
}

// Anything wider than u64 stays a string rather than losing precision
fn parse_integer(s: &str) -> Option<Number> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(Number::from(n));
    }
    s.parse::<u64>().ok().map(Number::from)
}
