//! JSON protocol handling (DynamoDB, ECS, Logs, SSM, ...)
//! - Request: POST with X-Amz-Target header, params as the JSON body
//! - Response: JSON

use super::RemoteError;
use crate::marshal::ResponseNode;
use anyhow::Result;
use serde_json::{Map, Value};

/// Serialize params as the request body
pub fn build_body(params: &Map<String, Value>) -> Result<String> {
    Ok(serde_json::to_string(params)?)
}

/// Parse a successful response body. Empty bodies are an empty mapping.
pub fn parse_response(body: &[u8]) -> Result<ResponseNode> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ResponseNode::Mapping(Default::default()));
    }
    let value: Value = serde_json::from_slice(body)?;
    Ok(ResponseNode::from(value))
}

/// Pull code and message out of a JSON error body.
///
/// `__type` may be namespaced (`com.amazonaws.x#ResourceNotFoundException`);
/// only the part after `#` is the code. The `x-amzn-ErrorType` header is used
/// when the body has no type.
pub fn parse_error(status: u16, error_type_header: Option<&str>, body: &[u8]) -> RemoteError {
    let text = String::from_utf8_lossy(body);
    let json: Value = match serde_json::from_slice(body) {
        Ok(json) => json,
        Err(_) => return RemoteError::unknown(status, &text),
    };

    let code = json
        .get("__type")
        .or_else(|| json.get("code"))
        .and_then(Value::as_str)
        .or(error_type_header)
        .map(|raw| {
            let raw = raw.rsplit('#').next().unwrap_or(raw);
            raw.split(':').next().unwrap_or(raw).to_string()
        });

    let message = json
        .get("message")
        .or_else(|| json.get("Message"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match code {
        Some(code) => RemoteError {
            status,
            code,
            message,
        },
        None => RemoteError::unknown(status, &text),
    }
}
