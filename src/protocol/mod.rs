//! Wire protocol handlers
//!
//! Each handler turns a normalized parameter mapping into a request and a
//! response body back into a [`ResponseNode`]. Only the RPC-style protocols
//! can be driven generically: REST protocols need a URI template per operation.

pub mod json;
pub mod query;

use crate::marshal::ResponseNode;
use chrono::DateTime;
use regex::Regex;
use std::sync::OnceLock;

/// Error codes meaning "no such operation on this service"
pub const UNKNOWN_OPERATION_CODES: [&str; 3] =
    ["InvalidAction", "UnknownOperationException", "UnknownOperation"];

/// Error reported by the remote service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl RemoteError {
    /// Error whose body could not be understood; the status stands in for the code
    pub fn unknown(status: u16, body: &str) -> Self {
        Self {
            status,
            code: status.to_string(),
            message: body.trim().to_string(),
        }
    }

    pub fn is_unknown_operation(&self) -> bool {
        UNKNOWN_OPERATION_CODES.contains(&self.code.as_str())
    }

    /// Same wording botocore uses, so existing log greps keep working
    pub fn describe(&self, action: &str) -> String {
        format!(
            "An error occurred ({}) when calling the {} operation: {}",
            self.code, action, self.message
        )
    }
}

fn rfc3339_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})$")
            .expect("valid regex")
    })
}

/// XML carries timestamps as RFC 3339 text; surface them as timestamp leaves
pub fn timestamp_or_string(s: String) -> ResponseNode {
    if rfc3339_pattern().is_match(&s) {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&s) {
            return ResponseNode::Timestamp(ts);
        }
    }
    ResponseNode::String(s)
}
