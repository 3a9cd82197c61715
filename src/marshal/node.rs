//! Response tree produced by a service call
//!
//! Same shape as a JSON document, plus the two leaf kinds that cannot be
//! serialized directly: timestamps and unread response bodies.

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::io::Read;

#[derive(Debug)]
pub enum ResponseNode {
    Null,
    Bool(bool),
    Int(i64),
    /// Only for values above `i64::MAX`
    UInt(u64),
    Float(f64),
    String(String),
    Timestamp(DateTime<FixedOffset>),
    Stream(StreamingBody),
    Sequence(Vec<ResponseNode>),
    Mapping(IndexMap<String, ResponseNode>),
}

impl ResponseNode {
    pub fn as_mapping(&self) -> Option<&IndexMap<String, ResponseNode>> {
        match self {
            ResponseNode::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut IndexMap<String, ResponseNode>> {
        match self {
            ResponseNode::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ResponseNode> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResponseNode::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ResponseNode::Int(n) => Some(*n),
            ResponseNode::UInt(n) => i64::try_from(*n).ok(),
            ResponseNode::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl From<Value> for ResponseNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ResponseNode::Null,
            Value::Bool(b) => ResponseNode::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ResponseNode::Int(i)
                } else if let Some(u) = n.as_u64() {
                    ResponseNode::UInt(u)
                } else {
                    ResponseNode::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => ResponseNode::String(s),
            Value::Array(items) => {
                ResponseNode::Sequence(items.into_iter().map(ResponseNode::from).collect())
            }
            Value::Object(map) => ResponseNode::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, ResponseNode::from(v)))
                    .collect(),
            ),
        }
    }
}

/// A response body that has not been read yet.
///
/// Reading consumes the body, so it can only ever be drained once.
pub struct StreamingBody {
    inner: Box<dyn Read + Send>,
    content_length: Option<u64>,
}

impl StreamingBody {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            inner: Box::new(reader),
            content_length: None,
        }
    }

    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn read_all(mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.content_length.unwrap_or(0) as usize);
        self.inner.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Debug for StreamingBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
