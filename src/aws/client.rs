//! AWS service client over the signed HTTP client
//!
//! One client per service per invocation. Credentials and region are
//! resolved up front so authorization problems surface before any call.

use super::credentials::{resolve_credentials, resolve_region};
use super::http::{get_service, is_transport_error, AwsHttpClient, HttpResponse, Protocol, ServiceDefinition};
use crate::dispatch::{action_name, ClientIdentity, Operation, ServiceClient};
use crate::error::{BridgeError, BridgeResult};
use crate::marshal::ResponseNode;
use crate::protocol::{self, RemoteError};
use crate::request::ConnectionConfig;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub struct AwsServiceClient {
    service: String,
    definition: ServiceDefinition,
    http: AwsHttpClient,
}

impl AwsServiceClient {
    /// Resolve service definition, region and credentials, then build the client
    pub fn connect(service: &str, config: &ConnectionConfig) -> BridgeResult<Self> {
        let definition = get_service(service).ok_or_else(|| {
            BridgeError::Configuration(format!("Unknown service '{}'", service))
        })?;

        let region = resolve_region(config).ok_or_else(|| {
            BridgeError::Configuration(
                "region must be specified (request, AWS_REGION or profile)".to_string(),
            )
        })?;

        let credentials =
            resolve_credentials(config).map_err(|e| BridgeError::authorization(e.to_string()))?;

        let http = AwsHttpClient::new(
            credentials,
            &region,
            config.endpoint_url.clone(),
            config.validate_certs,
        )
        .map_err(|e| BridgeError::network(e.to_string()))?;

        // Partition checks fail here rather than on first call
        http.get_endpoint(&definition)
            .map_err(|e| BridgeError::network(e.to_string()))?;

        debug!(
            "Connected {} client ({} protocol) in {}",
            service,
            definition.protocol.name(),
            http.region()
        );

        Ok(Self {
            service: service.to_string(),
            definition,
            http,
        })
    }

    async fn send(&self, action: &str, params: &Map<String, Value>) -> anyhow::Result<HttpResponse> {
        match self.definition.protocol {
            Protocol::Query | Protocol::Ec2 => {
                let pairs = protocol::query::serialize_params(params, self.definition.protocol);
                self.http.query_request(&self.definition, action, &pairs).await
            }
            Protocol::Json => {
                let body = protocol::json::build_body(params)?;
                self.http.json_request(&self.definition, action, &body).await
            }
            Protocol::RestJson | Protocol::RestXml => Err(anyhow::anyhow!(
                "{} protocol cannot be invoked generically",
                self.definition.protocol.name()
            )),
        }
    }

    fn remote_error(&self, response: &HttpResponse) -> RemoteError {
        match self.definition.protocol {
            Protocol::Json => protocol::json::parse_error(
                response.status,
                response.header("x-amzn-errortype"),
                &response.body,
            ),
            _ => protocol::query::parse_error(response.status, &response.text()),
        }
    }

    fn parse_body(&self, action: &str, response: &HttpResponse) -> anyhow::Result<(ResponseNode, Option<String>)> {
        match self.definition.protocol {
            Protocol::Json => Ok((protocol::json::parse_response(&response.body)?, None)),
            _ => protocol::query::parse_response(action, &response.text()),
        }
    }
}

#[async_trait]
impl ServiceClient for AwsServiceClient {
    fn service_name(&self) -> &str {
        &self.service
    }

    fn identity(&self) -> ClientIdentity {
        ClientIdentity::of_this_crate()
    }

    fn operation(&self, method: &str) -> BridgeResult<Operation> {
        if matches!(self.definition.protocol, Protocol::RestJson | Protocol::RestXml) {
            warn!(
                "{} uses the {} protocol, which needs per-operation routing",
                self.service,
                self.definition.protocol.name()
            );
            return Err(BridgeError::method_not_found(&self.service, method));
        }

        let action = action_name(method)
            .ok_or_else(|| BridgeError::method_not_found(&self.service, method))?;
        Ok(Operation {
            method: method.to_string(),
            action,
        })
    }

    async fn invoke(&self, operation: &Operation, params: Map<String, Value>) -> BridgeResult<ResponseNode> {
        let response = self
            .send(&operation.action, &params)
            .await
            .map_err(|e| {
                if is_transport_error(&e) {
                    BridgeError::network(e.to_string())
                } else {
                    BridgeError::Invocation(e.to_string())
                }
            })?;

        if !response.is_success() {
            let error = self.remote_error(&response);
            if error.is_unknown_operation() {
                return Err(BridgeError::method_not_found(&self.service, &operation.method));
            }
            return Err(BridgeError::Invocation(error.describe(&operation.action)));
        }

        let (mut node, body_request_id) = self
            .parse_body(&operation.action, &response)
            .map_err(|e| BridgeError::Invocation(format!("Unreadable {} response: {}", operation.action, e)))?;

        let request_id = response
            .request_id()
            .map(str::to_string)
            .or(body_request_id);

        match node.as_mapping_mut() {
            Some(map) => {
                map.insert(
                    "ResponseMetadata".to_string(),
                    response_metadata(&response, request_id),
                );
            }
            None => {
                let mut map = IndexMap::new();
                map.insert("Result".to_string(), node);
                map.insert(
                    "ResponseMetadata".to_string(),
                    response_metadata(&response, request_id),
                );
                node = ResponseNode::Mapping(map);
            }
        }

        Ok(node)
    }
}

/// `ResponseMetadata` block in the shape botocore produces
pub fn response_metadata(response: &HttpResponse, request_id: Option<String>) -> ResponseNode {
    let headers = response
        .headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), ResponseNode::String(v.clone())))
        .collect();

    let mut meta = IndexMap::new();
    meta.insert(
        "RequestId".to_string(),
        request_id.map(ResponseNode::String).unwrap_or(ResponseNode::Null),
    );
    meta.insert(
        "HTTPStatusCode".to_string(),
        ResponseNode::Int(i64::from(response.status)),
    );
    meta.insert("HTTPHeaders".to_string(), ResponseNode::Mapping(headers));
    meta.insert("RetryAttempts".to_string(), ResponseNode::Int(0));
    ResponseNode::Mapping(meta)
}
