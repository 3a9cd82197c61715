//! One bridge invocation, end to end
//!
//! normalize params -> expand tags/filters -> dispatch -> finish response.
//! Either a fully normalized response comes back or a single error does.

use crate::dispatch::{self, ClientIdentity, ServiceClient};
use crate::error::{BridgeError, BridgeResult};
use crate::marshal::{apply_expanders, normalize_input, normalize_output, snake_keys, ResponseNode};
use crate::request::InvocationRequest;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};

const METADATA_KEY: &str = "ResponseMetadata";

const CHANGED_KEY: &str = "changed";

/// Keys whose mapping contents keep their case when `preserve_tag_keys` is set
const TAG_KEYS: [&str; 2] = ["Tags", "tags"];

/// Resolve the client for `request.service` and run the request against it
pub async fn run(request: &InvocationRequest) -> BridgeResult<Value> {
    // Credential resolution may read files or run credential_process
    let service = request.service.clone();
    let connection = request.connection.clone();
    let client = tokio::task::spawn_blocking(move || dispatch::resolve_client(&service, &connection))
        .await
        .map_err(|e| BridgeError::Configuration(format!("Client setup did not complete: {}", e)))??;
    execute(client.as_ref(), request).await
}

/// Run a request against an already resolved client
pub async fn execute(client: &dyn ServiceClient, request: &InvocationRequest) -> BridgeResult<Value> {
    let operation = dispatch::resolve_method(client, &request.method)?;
    let params = prepare_params(request);
    debug!(
        "Invoking {}.{} with {} top-level params",
        client.service_name(),
        operation.action,
        params.len()
    );

    let raw = dispatch::invoke(client, &operation, params).await?;
    finish_response(raw, &client.identity(), request.preserve_tag_keys)
}

/// Outbound parameters: normalized tree with tags and filters injected
pub fn prepare_params(request: &InvocationRequest) -> Map<String, Value> {
    let normalized = normalize_input(
        &Value::Object(request.params.clone()),
        request.convert_to_integer,
        request.convert_param_case,
    );
    let mut params = match normalized {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    apply_expanders(
        &mut params,
        request.convert_param_case,
        &request.tags,
        &request.filters,
    );
    params
}

/// Turn a raw response into what the caller sees.
///
/// `ResponseMetadata` is replaced by `changed` (status code starts with `2`),
/// the client identity is added, and keys come out in snake_case. With
/// `preserve_tag_keys`, the keys inside converted tag mappings keep their case.
pub fn finish_response(
    raw: ResponseNode,
    identity: &ClientIdentity,
    preserve_tag_keys: bool,
) -> BridgeResult<Value> {
    let mut body = match raw {
        ResponseNode::Mapping(map) => map,
        other => {
            let mut map = IndexMap::new();
            map.insert("Result".to_string(), other);
            map
        }
    };

    let status = body
        .shift_remove(METADATA_KEY)
        .and_then(|meta| meta.get("HTTPStatusCode").and_then(ResponseNode::as_i64));
    let changed = match status {
        Some(code) => code.to_string().starts_with('2'),
        None => {
            warn!("Response carried no HTTP status code; reporting changed=false");
            false
        }
    };

    let normalized = normalize_output(ResponseNode::Mapping(body), true)?;
    let ignore: &[&str] = if preserve_tag_keys { &TAG_KEYS } else { &[] };
    let snaked = snake_keys(normalized, ignore);

    let mut out = Map::new();
    out.insert(CHANGED_KEY.to_string(), Value::Bool(changed));
    if let Value::Object(fields) = snaked {
        for (key, value) in fields {
            if key == CHANGED_KEY {
                debug!("Dropping response field '{}'; it collides with the changed flag", key);
                continue;
            }
            out.insert(key, value);
        }
    }
    out.insert(identity.name.clone(), Value::String(identity.version.clone()));
    Ok(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Operation;
    use crate::marshal::{KeyCase, StreamingBody};
    use async_trait::async_trait;
    use serde_json::json;
    use std::io::Cursor;
    use std::sync::Mutex;

    struct MockClient {
        response: Mutex<Option<BridgeResult<ResponseNode>>>,
        seen: Mutex<Option<(Operation, Map<String, Value>)>>,
    }

    impl MockClient {
        fn returning(response: BridgeResult<ResponseNode>) -> Self {
            Self {
                response: Mutex::new(Some(response)),
                seen: Mutex::new(None),
            }
        }

        fn seen(&self) -> (Operation, Map<String, Value>) {
            self.seen.lock().unwrap().clone().expect("client was not invoked")
        }
    }

    #[async_trait]
    impl ServiceClient for MockClient {
        fn service_name(&self) -> &str {
            "mock"
        }

        fn identity(&self) -> ClientIdentity {
            ClientIdentity {
                name: "mock_sdk".into(),
                version: "1.2.3".into(),
            }
        }

        fn operation(&self, method: &str) -> BridgeResult<Operation> {
            dispatch::action_name(method)
                .map(|action| Operation {
                    method: method.to_string(),
                    action,
                })
                .ok_or_else(|| BridgeError::method_not_found("mock", method))
        }

        async fn invoke(&self, operation: &Operation, params: Map<String, Value>) -> BridgeResult<ResponseNode> {
            *self.seen.lock().unwrap() = Some((operation.clone(), params));
            self.response.lock().unwrap().take().expect("invoked twice")
        }
    }

    fn response(value: Value) -> ResponseNode {
        ResponseNode::from(value)
    }

    fn request(value: Value) -> InvocationRequest {
        serde_json::from_value(value).unwrap()
    }

    fn identity() -> ClientIdentity {
        ClientIdentity {
            name: "mock_sdk".into(),
            version: "1.2.3".into(),
        }
    }

    #[test]
    fn test_finish_response_success() {
        let raw = response(json!({"ResponseMetadata": {"HTTPStatusCode": 200}, "Foo": "bar"}));
        let out = finish_response(raw, &identity(), false).unwrap();
        assert_eq!(out, json!({"changed": true, "foo": "bar", "mock_sdk": "1.2.3"}));
    }

    #[test]
    fn test_finish_response_not_found_status() {
        let raw = response(json!({"ResponseMetadata": {"HTTPStatusCode": 404}, "Foo": "bar"}));
        let out = finish_response(raw, &identity(), false).unwrap();
        assert_eq!(out["changed"], json!(false));
        assert_eq!(out["foo"], json!("bar"));
    }

    #[test]
    fn test_finish_response_without_metadata() {
        let out = finish_response(response(json!({"Foo": 1})), &identity(), false).unwrap();
        assert_eq!(out, json!({"changed": false, "foo": 1, "mock_sdk": "1.2.3"}));
    }

    #[test]
    fn test_finish_response_status_as_string() {
        let raw = response(json!({"ResponseMetadata": {"HTTPStatusCode": "204"}}));
        let out = finish_response(raw, &identity(), false).unwrap();
        assert_eq!(out["changed"], json!(true));
    }

    fn tagged_instances() -> ResponseNode {
        response(json!({
            "ResponseMetadata": {"HTTPStatusCode": 200},
            "Reservations": [{
                "Instances": [{
                    "InstanceId": "i-1",
                    "Tags": [{"Key": "CostCenter", "Value": "42"}]
                }]
            }]
        }))
    }

    #[test]
    fn test_finish_response_snake_cases_tag_keys() {
        let out = finish_response(tagged_instances(), &identity(), false).unwrap();
        assert_eq!(
            out["reservations"][0]["instances"][0],
            json!({"instance_id": "i-1", "tags": {"cost_center": "42"}})
        );
    }

    #[test]
    fn test_finish_response_can_preserve_tag_keys() {
        let out = finish_response(tagged_instances(), &identity(), true).unwrap();
        assert_eq!(
            out["reservations"][0]["instances"][0],
            json!({"instance_id": "i-1", "tags": {"CostCenter": "42"}})
        );
    }

    #[test]
    fn test_changed_flag_wins_over_response_field() {
        let raw = response(json!({
            "ResponseMetadata": {"HTTPStatusCode": 200},
            "Changed": "no",
            "Id": "x"
        }));
        let out = finish_response(raw, &identity(), false).unwrap();
        assert_eq!(out, json!({"changed": true, "id": "x", "mock_sdk": "1.2.3"}));
    }

    #[tokio::test]
    async fn test_run_resolves_client_off_the_runtime() {
        let mut req = InvocationRequest::new("teleporter", "beam_up");
        req.connection.region = Some("us-east-1".into());
        let err = run(&req).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown service 'teleporter'");
    }

    #[test]
    fn test_finish_response_drains_stream() {
        let mut map = IndexMap::new();
        map.insert(
            "ResponseMetadata".to_string(),
            response(json!({"HTTPStatusCode": 200})),
        );
        map.insert(
            "Payload".to_string(),
            ResponseNode::Stream(StreamingBody::new(Cursor::new(b"{\"ok\":1}".to_vec()))),
        );
        let out = finish_response(ResponseNode::Mapping(map), &identity(), false).unwrap();
        assert_eq!(out["payload"], json!("{\"ok\":1}"));
    }

    #[test]
    fn test_prepare_params_pascal_with_tags() {
        let req = request(json!({
            "service": "ec2",
            "method": "create_tags",
            "params": {"resources": ["i-1"], "dry_run": "__omit_place_holder__"},
            "convert_param_case": "Pascal",
            "tags": {"Name": "env"}
        }));
        let params = prepare_params(&req);
        assert_eq!(
            Value::Object(params),
            json!({"Resources": ["i-1"], "Tags": [{"Key": "Name", "Value": "env"}]})
        );
    }

    #[test]
    fn test_prepare_params_filters_skip_coercion() {
        let mut req = InvocationRequest::new("ec2", "describe_instances");
        req.convert_param_case = KeyCase::Pascal;
        req.params = json!({"max_results": "10"}).as_object().cloned().unwrap();
        req.filters = json!({"tag:Port": "8080"}).as_object().cloned().unwrap();
        let params = prepare_params(&req);
        assert_eq!(params["MaxResults"], json!(10));
        assert_eq!(
            params["Filters"],
            json!([{"Name": "tag:Port", "Values": ["8080"]}])
        );
    }

    #[tokio::test]
    async fn test_execute_end_to_end() {
        let client = MockClient::returning(Ok(response(json!({
            "ResponseMetadata": {"HTTPStatusCode": 200, "RequestId": "abc"},
            "TableNames": ["t1"]
        }))));
        let req = request(json!({
            "service": "dynamodb",
            "method": "list_tables",
            "params": {"limit": "5"},
            "convert_param_case": "Pascal"
        }));

        let out = execute(&client, &req).await.unwrap();
        assert_eq!(
            out,
            json!({"changed": true, "table_names": ["t1"], "mock_sdk": "1.2.3"})
        );

        let (operation, params) = client.seen();
        assert_eq!(operation.action, "ListTables");
        assert_eq!(Value::Object(params), json!({"Limit": 5}));
    }

    #[tokio::test]
    async fn test_execute_unknown_method_never_invokes() {
        let client = MockClient::returning(Ok(response(json!({}))));
        let req = InvocationRequest::new("mock", "no-such-method");
        let err = execute(&client, &req).await.unwrap_err();
        assert_eq!(err.to_string(), "Method 'no-such-method' not found on 'mock' client");
        assert!(client.seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_execute_surfaces_invocation_error() {
        let client = MockClient::returning(Err(BridgeError::Invocation(
            "An error occurred (ValidationError) when calling the CreateStack operation: bad".into(),
        )));
        let req = InvocationRequest::new("cloudformation", "create_stack");
        let err = execute(&client, &req).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Client error - An error occurred (ValidationError) when calling the CreateStack operation: bad"
        );
    }
}
