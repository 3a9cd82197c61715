//! Service dispatch boundary
//!
//! The marshalling core only ever talks to a [`ServiceClient`]. How a client
//! reaches its service (signed HTTP, a test double, ...) stays behind it.

use crate::aws::client::AwsServiceClient;
use crate::error::BridgeResult;
use crate::marshal::{to_pascal, ResponseNode};
use crate::request::ConnectionConfig;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

/// A resolved method: the caller's name and the wire action it maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub method: String,
    pub action: String,
}

/// Name and version of the client library, merged into every response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub name: String,
    pub version: String,
}

impl ClientIdentity {
    pub fn of_this_crate() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").replace('-', "_"),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[async_trait]
pub trait ServiceClient: Send + Sync {
    fn service_name(&self) -> &str;

    fn identity(&self) -> ClientIdentity;

    /// Resolve a method name to an operation this client can perform
    fn operation(&self, method: &str) -> BridgeResult<Operation>;

    /// Perform the call. The result must be a mapping carrying a
    /// `ResponseMetadata.HTTPStatusCode` entry.
    async fn invoke(&self, operation: &Operation, params: Map<String, Value>) -> BridgeResult<ResponseNode>;
}

/// Wire action for a method name.
///
/// `describe_instances` -> `DescribeInstances`. Names already starting with an
/// uppercase letter are used verbatim (`DescribeDBInstances` cannot be spelled
/// in snake_case). Anything that is not an identifier yields `None`.
pub fn action_name(method: &str) -> Option<String> {
    let first = method.chars().next()?;
    if !method.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    if first.is_ascii_uppercase() {
        return Some(method.to_string());
    }
    if !first.is_ascii_lowercase() {
        return None;
    }
    Some(to_pascal(method))
}

/// Build the client for a service
pub fn resolve_client(service: &str, config: &ConnectionConfig) -> BridgeResult<Box<dyn ServiceClient>> {
    let client = AwsServiceClient::connect(service, config)?;
    Ok(Box::new(client))
}

pub fn resolve_method(client: &dyn ServiceClient, method: &str) -> BridgeResult<Operation> {
    let operation = client.operation(method)?;
    debug!(
        "Resolved {}.{} to action {}",
        client.service_name(),
        method,
        operation.action
    );
    Ok(operation)
}

pub async fn invoke(
    client: &dyn ServiceClient,
    operation: &Operation,
    params: Map<String, Value>,
) -> BridgeResult<ResponseNode> {
    client.invoke(operation, params).await
}
