//! Query protocol handling (IAM, RDS, SQS, ...) and its EC2 dialect
//! - Request: form body `Action=X&Version=Y&...` with nested params flattened
//! - Response: XML wrapped in `<Action>Response` / `<Action>Result`

use super::{timestamp_or_string, RemoteError};
use crate::aws::http::{xml_to_json, Protocol};
use crate::marshal::ResponseNode;
use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

/// EC2 serializes these list parameters under a singular wire name
const EC2_WIRE_NAMES: &[(&str, &str)] = &[
    ("AllocationIds", "AllocationId"),
    ("Filters", "Filter"),
    ("GroupIds", "GroupId"),
    ("GroupNames", "GroupName"),
    ("ImageIds", "ImageId"),
    ("InstanceIds", "InstanceId"),
    ("InternetGatewayIds", "InternetGatewayId"),
    ("KeyNames", "KeyName"),
    ("NatGatewayIds", "NatGatewayId"),
    ("NetworkInterfaceIds", "NetworkInterfaceId"),
    ("Owners", "Owner"),
    ("PublicIps", "PublicIp"),
    ("RegionNames", "RegionName"),
    ("Resources", "ResourceId"),
    ("RouteTableIds", "RouteTableId"),
    ("SecurityGroupIds", "SecurityGroupId"),
    ("SecurityGroups", "SecurityGroup"),
    ("SnapshotIds", "SnapshotId"),
    ("SubnetIds", "SubnetId"),
    ("TagSpecifications", "TagSpecification"),
    ("Tags", "Tag"),
    ("Values", "Value"),
    ("VolumeIds", "VolumeId"),
    ("VpcIds", "VpcId"),
    ("ZoneNames", "ZoneName"),
];

/// EC2 response elements whose wire name differs from the API shape's member name
const EC2_MEMBER_NAMES: &[(&str, &str)] = &[("tagSet", "Tags")];

/// Flatten a parameter mapping into Query protocol pairs.
///
/// Nested mappings become `Key.Sub`, sequences `Key.member.N` (query) or
/// `Key.N` (ec2), indices start at 1. Nulls are skipped.
pub fn serialize_params(params: &Map<String, Value>, protocol: Protocol) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in params {
        flatten(&mut pairs, wire_name(key, protocol), value, protocol);
    }
    pairs
}

fn wire_name(key: &str, protocol: Protocol) -> String {
    if protocol == Protocol::Ec2 {
        if let Some((_, wire)) = EC2_WIRE_NAMES.iter().find(|(name, _)| *name == key) {
            return wire.to_string();
        }
    }
    key.to_string()
}

fn flatten(pairs: &mut Vec<(String, String)>, prefix: String, value: &Value, protocol: Protocol) {
    match value {
        Value::Null => {}
        Value::Bool(b) => pairs.push((prefix, b.to_string())),
        Value::Number(n) => pairs.push((prefix, n.to_string())),
        Value::String(s) => pairs.push((prefix, s.clone())),
        Value::Array(items) => {
            // An empty list is still sent so the service sees "set to nothing"
            if items.is_empty() && protocol == Protocol::Query {
                pairs.push((prefix, String::new()));
                return;
            }
            for (i, item) in items.iter().enumerate() {
                let item_prefix = match protocol {
                    Protocol::Ec2 => format!("{}.{}", prefix, i + 1),
                    _ => format!("{}.member.{}", prefix, i + 1),
                };
                flatten(pairs, item_prefix, item, protocol);
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                let child_prefix = format!("{}.{}", prefix, wire_name(key, protocol));
                flatten(pairs, child_prefix, child, protocol);
            }
        }
    }
}

/// Parse a successful Query/EC2 response body.
///
/// Returns the unwrapped result tree and the request id, if the body has one.
pub fn parse_response(action: &str, body: &str) -> Result<(ResponseNode, Option<String>)> {
    if body.trim().is_empty() {
        return Ok((ResponseNode::Mapping(Default::default()), None));
    }

    let json = xml_to_json(body)?;
    let root = match json {
        Value::Object(map) => {
            let wrapper = format!("{}Response", action);
            match map.into_iter().find(|(k, _)| *k == wrapper) {
                Some((_, v)) => v,
                None => return Err(anyhow!("Missing <{}> in response", wrapper)),
            }
        }
        _ => return Err(anyhow!("Unexpected response document")),
    };

    let mut root = match root {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => return Err(anyhow!("Unexpected response content: {}", other)),
    };

    // EC2 puts the request id next to the payload, everyone else in ResponseMetadata
    let request_id = root
        .shift_remove("ResponseMetadata")
        .and_then(|m| m.get("RequestId").and_then(Value::as_str).map(str::to_string))
        .or_else(|| {
            root.shift_remove("requestId")
                .and_then(|v| v.as_str().map(str::to_string))
        });

    let result_key = format!("{}Result", action);
    let result = match root.shift_remove(&result_key) {
        Some(result) => result,
        None => Value::Object(root),
    };

    let result = match collapse_lists(result) {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    Ok((into_node(result), request_id))
}

/// Turn `{"member": [...]}` / `{"item": ...}` wrappers into plain sequences
fn collapse_lists(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(key) = map.keys().next() {
                    if key == "member" || key == "item" {
                        let inner = map.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null);
                        return Value::Array(match inner {
                            Value::Array(items) => items.into_iter().map(collapse_lists).collect(),
                            other => vec![collapse_lists(other)],
                        });
                    }
                }
            }
            Value::Object(
                map.into_iter()
                    .map(|(k, v)| (member_name(k), collapse_lists(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(collapse_lists).collect()),
        other => other,
    }
}

fn member_name(key: String) -> String {
    match EC2_MEMBER_NAMES.iter().find(|(wire, _)| *wire == key) {
        Some((_, member)) => member.to_string(),
        None => key,
    }
}

fn into_node(value: Value) -> ResponseNode {
    match value {
        Value::String(s) => timestamp_or_string(s),
        Value::Array(items) => ResponseNode::Sequence(items.into_iter().map(into_node).collect()),
        Value::Object(map) => {
            ResponseNode::Mapping(map.into_iter().map(|(k, v)| (k, into_node(v))).collect())
        }
        other => ResponseNode::from(other),
    }
}

/// Find the `<Error><Code/><Message/></Error>` element in an error body
pub fn parse_error(status: u16, body: &str) -> RemoteError {
    let fallback = || RemoteError::unknown(status, body);
    let json = match xml_to_json(body) {
        Ok(json) => json,
        Err(_) => return fallback(),
    };

    match find_error(&json) {
        Some(error) => RemoteError {
            status,
            code: error
                .get("Code")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            message: error
                .get("Message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        None => fallback(),
    }
}

fn find_error(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) => {
            if let Some(error) = map.get("Error") {
                return match error {
                    Value::Array(items) => items.first(),
                    other => Some(other),
                };
            }
            map.values().find_map(find_error)
        }
        _ => None,
    }
}
