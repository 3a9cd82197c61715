//! Key-naming conventions
//!
//! Outbound parameter keys go from snake_case to whatever the target API
//! expects; inbound response keys always come back as snake_case.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Case convention applied uniformly to every outbound parameter key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum KeyCase {
    #[default]
    #[serde(rename = "none")]
    AsIs,
    #[serde(rename = "camel")]
    Camel,
    #[serde(rename = "Pascal")]
    Pascal,
}

impl KeyCase {
    pub fn apply(self, key: &str) -> String {
        match self {
            KeyCase::AsIs => identity(key),
            KeyCase::Camel => to_camel(key),
            KeyCase::Pascal => to_pascal(key),
        }
    }
}

/// `this_function_name` -> `ThisFunctionName`
///
/// Each `_`-separated token gets its first letter upper-cased and the rest
/// lower-cased. Empty tokens (`a__b`) contribute nothing.
pub fn to_pascal(key: &str) -> String {
    key.split('_').map(capitalize).collect()
}

/// `this_function_name` -> `thisFunctionName`
pub fn to_camel(key: &str) -> String {
    let pascal = to_pascal(key);
    let mut chars = pascal.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn identity(key: &str) -> String {
    key.to_string()
}

fn capitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

struct SnakePatterns {
    plural_acronym: Regex,
    first_cap: Regex,
    all_cap: Regex,
}

fn snake_patterns() -> &'static SnakePatterns {
    static PATTERNS: OnceLock<SnakePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| SnakePatterns {
        // Pluralised acronyms such as TargetGroupARNs
        plural_acronym: Regex::new(r"[A-Z]{3,}s$").expect("valid regex"),
        first_cap: Regex::new(r"(.)([A-Z][a-z]+)").expect("valid regex"),
        all_cap: Regex::new(r"([a-z0-9])([A-Z]+)").expect("valid regex"),
    })
}

/// Convert an API response key to snake_case.
///
/// `HTTPStatusCode` -> `http_status_code`, `TargetGroupARNs` -> `target_group_arns`
pub fn camel_to_snake(key: &str) -> String {
    let patterns = snake_patterns();

    let s1 = patterns
        .plural_acronym
        .replace(key, |caps: &regex::Captures| format!("_{}", caps[0].to_lowercase()));
    let s1 = if s1.starts_with('_') && !key.starts_with('_') {
        s1[1..].to_string()
    } else {
        s1.into_owned()
    };

    let s2 = patterns.first_cap.replace_all(&s1, "${1}_${2}");
    patterns
        .all_cap
        .replace_all(&s2, "${1}_${2}")
        .to_lowercase()
}

/// Rewrite every mapping key in `value` to snake_case.
///
/// Keys listed in `ignore` are converted themselves but the value under them
/// is copied untouched (used for tag mappings, whose keys are user data).
pub fn snake_keys(value: Value, ignore: &[&str]) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                let child = if ignore.contains(&key.as_str()) {
                    child
                } else {
                    snake_keys(child, ignore)
                };
                out.insert(camel_to_snake(&key), child);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| snake_keys(item, ignore))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pascal_and_camel() {
        assert_eq!(to_pascal("this_function_name"), "ThisFunctionName");
        assert_eq!(to_camel("this_function_name"), "thisFunctionName");
        assert_eq!(to_pascal("dry_run"), "DryRun");
        assert_eq!(to_camel("group_name"), "groupName");
    }

    #[test]
    fn test_camel_differs_from_pascal_only_in_first_letter() {
        for key in ["a", "group_id", "x_y_z", "already", "max_results"] {
            let pascal = to_pascal(key);
            let camel = to_camel(key);
            assert_eq!(pascal[1..], camel[1..], "key {}", key);
            assert_eq!(camel[..1], pascal[..1].to_lowercase());
        }
    }

    #[test]
    fn test_empty_tokens_are_skipped() {
        assert_eq!(to_pascal("a__b"), "AB");
        assert_eq!(to_pascal("_leading"), "Leading");
        assert_eq!(to_pascal("trailing_"), "Trailing");
        assert_eq!(to_camel(""), "");
        assert_eq!(to_camel("__"), "");
    }

    #[test]
    fn test_pascal_lowercases_token_tails() {
        // Same as str.capitalize(): the rest of each token is lowered
        assert_eq!(to_pascal("db_ARN"), "DbArn");
    }

    #[test]
    fn test_key_case_apply() {
        assert_eq!(KeyCase::AsIs.apply("group_name"), "group_name");
        assert_eq!(KeyCase::Camel.apply("tags"), "tags");
        assert_eq!(KeyCase::Pascal.apply("tags"), "Tags");
        assert_eq!(KeyCase::Pascal.apply("filters"), "Filters");
    }

    #[test]
    fn test_key_case_deserialize() {
        let case: KeyCase = serde_json::from_str(r#""Pascal""#).unwrap();
        assert_eq!(case, KeyCase::Pascal);
        let case: KeyCase = serde_json::from_str(r#""camel""#).unwrap();
        assert_eq!(case, KeyCase::Camel);
        assert!(serde_json::from_str::<KeyCase>(r#""kebab""#).is_err());
    }

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("InstanceId"), "instance_id");
        assert_eq!(camel_to_snake("HTTPStatusCode"), "http_status_code");
        assert_eq!(camel_to_snake("TargetGroupARNs"), "target_group_arns");
        assert_eq!(camel_to_snake("ARNs"), "arns");
        assert_eq!(camel_to_snake("instanceState"), "instance_state");
        assert_eq!(camel_to_snake("already_snake"), "already_snake");
        assert_eq!(camel_to_snake("DBInstanceIdentifier"), "db_instance_identifier");
    }

    #[test]
    fn test_snake_keys_recurses_and_honours_ignore() {
        let value = json!({
            "Reservations": [{"InstanceId": "i-1"}],
            "Tags": {"CostCenter": "42"}
        });
        let out = snake_keys(value, &["Tags"]);
        assert_eq!(
            out,
            json!({
                "reservations": [{"instance_id": "i-1"}],
                "tags": {"CostCenter": "42"}
            })
        );
    }
}
