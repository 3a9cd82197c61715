//! Response tree normalization
//!
//! Flattens a [`ResponseNode`] into plain JSON: timestamps become strings,
//! response bodies are drained, and (optionally) tag lists become maps.

use super::expand::tag_list_to_map;
use super::node::ResponseNode;
use crate::error::BridgeResult;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, FixedOffset, Timelike};
use serde_json::{Map, Number, Value};
use tracing::trace;

const TAG_KEYS: [&str; 2] = ["tags", "Tags"];

/// Normalize a response tree into serializable JSON.
///
/// Takes the tree by value: any [`StreamingBody`](super::node::StreamingBody)
/// inside is read to the end here and cannot be read again.
pub fn normalize_output(node: ResponseNode, convert_tag_lists: bool) -> BridgeResult<Value> {
    let value = match node {
        ResponseNode::Null => Value::Null,
        ResponseNode::Bool(b) => Value::Bool(b),
        ResponseNode::Int(n) => Value::Number(Number::from(n)),
        ResponseNode::UInt(n) => Value::Number(Number::from(n)),
        ResponseNode::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ResponseNode::String(s) => Value::String(s),
        ResponseNode::Timestamp(ts) => Value::String(format_timestamp(&ts)),
        ResponseNode::Stream(body) => {
            let bytes = body.read_all()?;
            trace!("Drained response body: {} bytes", bytes.len());
            bytes_to_value(bytes)
        }
        ResponseNode::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(|item| normalize_output(item, convert_tag_lists))
                .collect::<BridgeResult<Vec<_>>>()?,
        ),
        ResponseNode::Mapping(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                out.insert(key, normalize_output(child, convert_tag_lists)?);
            }
            if convert_tag_lists {
                convert_tags_in_place(&mut out);
            }
            Value::Object(out)
        }
    };
    Ok(value)
}

fn convert_tags_in_place(map: &mut Map<String, Value>) {
    for tag_key in TAG_KEYS {
        let converted = match map.get(tag_key) {
            Some(Value::Array(items)) => tag_list_to_map(items),
            _ => None,
        };
        if let Some(tags) = converted {
            map.insert(tag_key.to_string(), Value::Object(tags));
        }
    }
}

/// `2016-03-01 12:30:00+00:00`, with `.ffffff` microseconds when non-zero
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    if ts.nanosecond() / 1_000 == 0 {
        ts.format("%Y-%m-%d %H:%M:%S%:z").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S%.6f%:z").to_string()
    }
}

// Text bodies stay readable; anything else is base64 so the result is still JSON
fn bytes_to_value(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(text) => Value::String(text),
        Err(err) => Value::String(STANDARD.encode(err.into_bytes())),
    }
}
