//! Failure taxonomy for a single bridge invocation
//!
//! Every failure is fatal: the bridge returns exactly one normalized response
//! or exactly one of these errors, never both.

use thiserror::Error;

/// Which stage of client construction or transport failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFailure {
    /// Credentials missing, unreadable or rejected
    Authorization,
    /// Endpoint unreachable or the transport broke mid-request
    Network,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The bridge cannot be set up to talk to the requested service
    #[error("{0}")]
    Configuration(String),

    #[error("{}", connection_message(*kind, message))]
    Connection {
        kind: ConnectionFailure,
        message: String,
    },

    /// The remote service rejected the call; the text is the service's own
    #[error("Client error - {0}")]
    Invocation(String),

    #[error("Method '{method}' not found on '{service}' client")]
    MethodNotFound { service: String, method: String },

    #[error("Failed to read response body - {0}")]
    Stream(#[from] std::io::Error),
}

fn connection_message(kind: ConnectionFailure, message: &str) -> String {
    match kind {
        ConnectionFailure::Authorization => format!("Can't authorize connection - {}", message),
        ConnectionFailure::Network => format!("Connection Error - {}", message),
    }
}

impl BridgeError {
    pub fn authorization(message: impl Into<String>) -> Self {
        BridgeError::Connection {
            kind: ConnectionFailure::Authorization,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        BridgeError::Connection {
            kind: ConnectionFailure::Network,
            message: message.into(),
        }
    }

    pub fn method_not_found(service: &str, method: &str) -> Self {
        BridgeError::MethodNotFound {
            service: service.to_string(),
            method: method.to_string(),
        }
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
