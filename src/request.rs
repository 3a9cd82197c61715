//! Invocation request and connection settings
//!
//! Field names and aliases follow the Ansible-style module arguments the bridge
//! is usually driven from, so existing task files deserialize unchanged.

use crate::marshal::KeyCase;
use serde::de::{self, Deserializer, Unexpected};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One call to make: which service, which method, with what parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvocationRequest {
    #[serde(alias = "service_name")]
    pub service: String,

    #[serde(alias = "method_name", alias = "action")]
    pub method: String,

    #[serde(default, alias = "method_params")]
    pub params: Map<String, Value>,

    /// Key case for outbound parameters; `null` or absent means unchanged
    #[serde(default, deserialize_with = "deserialize_key_case")]
    pub convert_param_case: KeyCase,

    /// Whether digit-only strings become integers
    #[serde(default = "default_true", deserialize_with = "deserialize_yes_no")]
    pub convert_to_integer: bool,

    #[serde(default)]
    pub tags: Map<String, Value>,

    #[serde(default)]
    pub filters: Map<String, Value>,

    /// Keep the caller's case for keys inside response tag mappings
    #[serde(default, deserialize_with = "deserialize_yes_no")]
    pub preserve_tag_keys: bool,

    #[serde(flatten)]
    pub connection: ConnectionConfig,
}

impl InvocationRequest {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            params: Map::new(),
            convert_param_case: KeyCase::AsIs,
            convert_to_integer: true,
            tags: Map::new(),
            filters: Map::new(),
            preserve_tag_keys: false,
            connection: ConnectionConfig::default(),
        }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Where and as whom to connect. Opaque to the marshalling core.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    #[serde(default, alias = "aws_region", alias = "ec2_region")]
    pub region: Option<String>,

    #[serde(default, alias = "aws_profile")]
    pub profile: Option<String>,

    /// Custom endpoint used for every service (LocalStack, VPC endpoints)
    #[serde(default, alias = "ec2_url")]
    pub endpoint_url: Option<String>,

    #[serde(default, alias = "aws_access_key_id")]
    pub aws_access_key: Option<String>,

    #[serde(default, alias = "aws_secret_access_key")]
    pub aws_secret_key: Option<String>,

    #[serde(default, alias = "aws_security_token", alias = "session_token")]
    pub security_token: Option<String>,

    #[serde(default = "default_true", deserialize_with = "deserialize_yes_no")]
    pub validate_certs: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            endpoint_url: None,
            aws_access_key: None,
            aws_secret_key: None,
            security_token: None,
            validate_certs: true,
        }
    }
}

impl ConnectionConfig {
    pub fn profile_name(&self) -> &str {
        self.profile.as_deref().unwrap_or("default")
    }
}

fn default_true() -> bool {
    true
}

fn deserialize_key_case<'de, D>(deserializer: D) -> Result<KeyCase, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<KeyCase>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts JSON booleans as well as the `yes`/`no`/`true`/`false` strings
/// YAML-sourced task arguments tend to arrive as.
fn deserialize_yes_no<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Text(s) => match s.to_ascii_lowercase().as_str() {
            "yes" | "true" | "on" | "1" => Ok(true),
            "no" | "false" | "off" | "0" => Ok(false),
            _ => Err(de::Error::invalid_value(
                Unexpected::Str(&s),
                &"yes, no, true or false",
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let req = InvocationRequest::from_json(r#"{"service": "ec2", "method": "describe_instances"}"#)
            .unwrap();
        assert_eq!(req.service, "ec2");
        assert_eq!(req.method, "describe_instances");
        assert!(req.params.is_empty());
        assert_eq!(req.convert_param_case, KeyCase::AsIs);
        assert!(req.convert_to_integer);
        assert!(req.tags.is_empty());
        assert!(req.filters.is_empty());
        assert!(!req.preserve_tag_keys);
        assert!(req.connection.validate_certs);
        assert_eq!(req.connection.profile_name(), "default");
    }

    #[test]
    fn test_aliases() {
        let req = InvocationRequest::from_json(
            r#"{
                "service_name": "organizations",
                "action": "move_account",
                "method_params": {"AccountId": "123456789101"},
                "convert_to_integer": "no",
                "aws_region": "eu-west-1",
                "aws_profile": "ops",
                "ec2_url": "http://localhost:4566"
            }"#,
        )
        .unwrap();
        assert_eq!(req.service, "organizations");
        assert_eq!(req.method, "move_account");
        assert_eq!(req.params["AccountId"], json!("123456789101"));
        assert!(!req.convert_to_integer);
        assert_eq!(req.connection.region.as_deref(), Some("eu-west-1"));
        assert_eq!(req.connection.profile_name(), "ops");
        assert_eq!(
            req.connection.endpoint_url.as_deref(),
            Some("http://localhost:4566")
        );
    }

    #[test]
    fn test_convert_param_case_values() {
        let req = InvocationRequest::from_json(
            r#"{"service": "ec2", "method": "m", "convert_param_case": "Pascal"}"#,
        )
        .unwrap();
        assert_eq!(req.convert_param_case, KeyCase::Pascal);

        let req = InvocationRequest::from_json(
            r#"{"service": "ec2", "method": "m", "convert_param_case": null}"#,
        )
        .unwrap();
        assert_eq!(req.convert_param_case, KeyCase::AsIs);

        let err = InvocationRequest::from_json(
            r#"{"service": "ec2", "method": "m", "convert_param_case": "snake"}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_yes_no_flag() {
        for (text, expected) in [("\"yes\"", true), ("\"No\"", false), ("true", true), ("false", false)] {
            let json = format!(
                r#"{{"service": "s", "method": "m", "convert_to_integer": {}}}"#,
                text
            );
            let req = InvocationRequest::from_json(&json).unwrap();
            assert_eq!(req.convert_to_integer, expected, "input {}", text);
        }
        assert!(InvocationRequest::from_json(
            r#"{"service": "s", "method": "m", "convert_to_integer": "maybe"}"#
        )
        .is_err());
    }

    #[test]
    fn test_missing_service_is_rejected() {
        assert!(InvocationRequest::from_json(r#"{"method": "m"}"#).is_err());
    }
}
