//! Tag and filter list shapes
//!
//! Many AWS APIs take tags as `[{"Key": k, "Value": v}]` and filters as
//! `[{"Name": n, "Values": [..]}]`. Callers would rather write a plain map.

use super::case::KeyCase;
use serde_json::{json, Map, Value};

/// `{"Name": "web"}` -> `[{"Key": "Name", "Value": "web"}]`
pub fn tag_map_to_list(tags: &Map<String, Value>) -> Value {
    Value::Array(
        tags.iter()
            .map(|(key, value)| json!({"Key": key, "Value": tag_value_text(value)}))
            .collect(),
    )
}

fn tag_value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `{"instance-state-name": "running"}` -> `[{"Name": "instance-state-name", "Values": ["running"]}]`
pub fn filter_map_to_list(filters: &Map<String, Value>) -> Value {
    Value::Array(
        filters
            .iter()
            .map(|(name, value)| json!({"Name": name, "Values": filter_values(value)}))
            .collect(),
    )
}

fn filter_values(value: &Value) -> Value {
    match value {
        Value::Array(_) => value.clone(),
        Value::Bool(b) => json!([b.to_string()]),
        Value::Number(n) => json!([n.to_string()]),
        other => json!([other]),
    }
}

/// Inverse of [`tag_map_to_list`]. Accepts both `Key`/`Value` and the
/// lower-case `key`/`value` spelling EC2's XML uses.
///
/// Returns `None` when any item is not such a pair (KMS `TagKey`/`TagValue`,
/// plain strings, ...); the caller keeps the list as it was.
pub fn tag_list_to_map(items: &[Value]) -> Option<Map<String, Value>> {
    let mut tags = Map::new();
    for item in items {
        let key = item.get("Key").or_else(|| item.get("key"));
        let value = item.get("Value").or_else(|| item.get("value"));
        match (key, value) {
            (Some(Value::String(key)), Some(value)) => {
                tags.insert(key.clone(), value.clone());
            }
            _ => return None,
        }
    }
    Some(tags)
}

/// Inject the expanded `tags` and `filters` into already-normalized params.
///
/// The target keys are the literal words `tags`/`filters` passed through the
/// active case convention. Empty maps add nothing.
pub fn apply_expanders(
    params: &mut Map<String, Value>,
    key_case: KeyCase,
    tags: &Map<String, Value>,
    filters: &Map<String, Value>,
) {
    if !tags.is_empty() {
        params.insert(key_case.apply("tags"), tag_map_to_list(tags));
    }
    if !filters.is_empty() {
        params.insert(key_case.apply("filters"), filter_map_to_list(filters));
    }
}
