//! Lightweight AWS HTTP client with SigV4 signing
//!
//! One signed request per call. The response is handed back whole (status,
//! headers, body) so callers can build their own metadata from it.

use super::credentials::{mask_credential, Credentials};
use anyhow::{anyhow, Result};
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4::SigningParams;
use aws_smithy_runtime_api::client::identity::Identity;
use reqwest::Client;
use std::time::SystemTime;
use tracing::{debug, trace, warn};

const EUSC_PREFIX: &str = "eusc-";

/// AWS Service definition
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    /// Service signing name (e.g., "ec2", "sts", "elasticloadbalancing")
    pub signing_name: &'static str,
    /// Service endpoint prefix (e.g., "ec2", "monitoring")
    pub endpoint_prefix: &'static str,
    /// API version sent with Query/EC2 requests (e.g., "2016-11-15")
    pub api_version: &'static str,
    pub protocol: Protocol,
    /// Target prefix for JSON protocol (e.g., "AWSCognitoIdentityProviderService")
    pub target_prefix: Option<&'static str>,
    /// JSON protocol content-type version ("1.0" or "1.1")
    pub json_version: &'static str,
    /// Whether this is a global service (uses us-east-1)
    pub is_global: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// IAM/RDS style: Action=X&Version=Y form body, lists as `Key.member.N`
    Query,
    /// EC2 dialect of Query: lists as `Key.N`
    Ec2,
    /// JSON-RPC style with X-Amz-Target header
    Json,
    /// REST with JSON body
    RestJson,
    /// REST with XML body (S3)
    RestXml,
}

impl Protocol {
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Query => "query",
            Protocol::Ec2 => "ec2",
            Protocol::Json => "json",
            Protocol::RestJson => "rest-json",
            Protocol::RestXml => "rest-xml",
        }
    }
}

const fn query(signing_name: &'static str, api_version: &'static str) -> ServiceDefinition {
    ServiceDefinition {
        signing_name,
        endpoint_prefix: signing_name,
        api_version,
        protocol: Protocol::Query,
        target_prefix: None,
        json_version: "1.1",
        is_global: false,
    }
}

const fn json(
    signing_name: &'static str,
    api_version: &'static str,
    target_prefix: &'static str,
) -> ServiceDefinition {
    ServiceDefinition {
        signing_name,
        endpoint_prefix: signing_name,
        api_version,
        protocol: Protocol::Json,
        target_prefix: Some(target_prefix),
        json_version: "1.1",
        is_global: false,
    }
}

const fn rest(signing_name: &'static str, api_version: &'static str, protocol: Protocol) -> ServiceDefinition {
    ServiceDefinition {
        signing_name,
        endpoint_prefix: signing_name,
        api_version,
        protocol,
        target_prefix: None,
        json_version: "1.1",
        is_global: false,
    }
}

/// Look up a service by the name callers use for it
pub fn get_service(name: &str) -> Option<ServiceDefinition> {
    let def = match name {
        "ec2" => ServiceDefinition {
            protocol: Protocol::Ec2,
            ..query("ec2", "2016-11-15")
        },
        "iam" => ServiceDefinition {
            is_global: true,
            ..query("iam", "2010-05-08")
        },
        "sts" => query("sts", "2011-06-15"),
        "rds" => query("rds", "2014-10-31"),
        "cloudformation" => query("cloudformation", "2010-05-15"),
        "sqs" => query("sqs", "2012-11-05"),
        "sns" => query("sns", "2010-03-31"),
        "elasticache" => query("elasticache", "2015-02-02"),
        "autoscaling" => query("autoscaling", "2011-01-01"),
        "elb" => query("elasticloadbalancing", "2012-06-01"),
        "elasticloadbalancing" | "elbv2" => query("elasticloadbalancing", "2015-12-01"),
        "cloudwatch" | "monitoring" => query("monitoring", "2010-08-01"),
        "dynamodb" => ServiceDefinition {
            json_version: "1.0",
            ..json("dynamodb", "2012-08-10", "DynamoDB_20120810")
        },
        "ecs" => json("ecs", "2014-11-13", "AmazonEC2ContainerServiceV20141113"),
        "cloudwatchlogs" | "logs" => json("logs", "2014-03-28", "Logs_20140328"),
        "secretsmanager" => json("secretsmanager", "2017-10-17", "secretsmanager"),
        "ssm" => json("ssm", "2014-11-06", "AmazonSSM"),
        "ecr" => json("ecr", "2015-09-21", "AmazonEC2ContainerRegistry_V20150921"),
        "kms" => json("kms", "2014-11-01", "TrentService"),
        "acm" => json("acm", "2015-12-08", "CertificateManager"),
        "eventbridge" | "events" => json("events", "2015-10-07", "AWSEvents"),
        "codepipeline" => json("codepipeline", "2015-07-09", "CodePipeline_20150709"),
        "codebuild" => json("codebuild", "2016-10-06", "CodeBuild_20161006"),
        "cognitoidentityprovider" | "cognito-idp" => json(
            "cognito-idp",
            "2016-04-18",
            "AWSCognitoIdentityProviderService",
        ),
        "cloudtrail" => json(
            "cloudtrail",
            "2013-11-01",
            "com.amazonaws.cloudtrail.v20131101.CloudTrail_20131101",
        ),
        "athena" => json("athena", "2017-05-18", "AmazonAthena"),
        "kinesis" => json("kinesis", "2013-12-02", "Kinesis_20131202"),
        "organizations" => ServiceDefinition {
            is_global: true,
            ..json("organizations", "2016-11-28", "AWSOrganizationsV20161128")
        },
        "s3" => rest("s3", "2006-03-01", Protocol::RestXml),
        "lambda" => rest("lambda", "2015-03-31", Protocol::RestJson),
        "eks" => rest("eks", "2017-11-01", Protocol::RestJson),
        "apigateway" => rest("apigateway", "2015-07-09", Protocol::RestJson),
        "route53" => ServiceDefinition {
            is_global: true,
            ..rest("route53", "2013-04-01", Protocol::RestXml)
        },
        "cloudfront" => ServiceDefinition {
            is_global: true,
            ..rest("cloudfront", "2020-05-31", Protocol::RestXml)
        },
        _ => return None,
    };
    Some(def)
}

/// Everything the server sent back, unparsed
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header("x-amzn-requestid")
            .or_else(|| self.header("x-amz-request-id"))
    }
}

/// AWS HTTP Client
pub struct AwsHttpClient {
    http_client: Client,
    credentials: Credentials,
    region: String,
    endpoint_url: Option<String>,
}

impl AwsHttpClient {
    /// Create a new AWS HTTP client
    pub fn new(
        credentials: Credentials,
        region: &str,
        endpoint_url: Option<String>,
        validate_certs: bool,
    ) -> Result<Self> {
        debug!(
            "Creating AWS HTTP client for region: {}, access_key: {}, endpoint_url: {:?}",
            region,
            mask_credential(&credentials.access_key_id),
            endpoint_url
        );
        if !validate_certs {
            warn!("TLS certificate validation is disabled");
        }
        let http_client = Client::builder()
            .danger_accept_invalid_certs(!validate_certs)
            .build()?;
        Ok(Self {
            http_client,
            credentials,
            region: region.to_string(),
            endpoint_url,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Determine which region should be used for a service (handles global services in ESC)
    fn effective_region<'a>(&'a self, service: &ServiceDefinition) -> &'a str {
        if service.is_global && !self.region.starts_with(EUSC_PREFIX) {
            "us-east-1"
        } else {
            &self.region
        }
    }

    /// Get the endpoint URL for a service, validating partition support when needed
    pub fn get_endpoint(&self, service: &ServiceDefinition) -> Result<String> {
        // A custom endpoint applies to every service (LocalStack, etc.)
        if let Some(ref endpoint) = self.endpoint_url {
            return Ok(endpoint.trim_end_matches('/').to_string());
        }

        let region = self.effective_region(service);
        let domain = Self::endpoint_domain(&self.region);

        if service.is_global {
            return match service.signing_name {
                "iam" => {
                    if domain == "amazonaws.eu" {
                        Ok(format!("https://iam.{}.{}", self.region, domain))
                    } else {
                        Ok("https://iam.amazonaws.com".to_string())
                    }
                }
                "cloudfront" if self.region.starts_with(EUSC_PREFIX) => Err(anyhow!(
                    "Service 'cloudfront' is not available in ESC regions yet"
                )),
                "cloudfront" => Ok(format!("https://cloudfront.{}", domain)),
                "route53" => Ok(format!("https://route53.{}", domain)),
                _ => Ok(format!(
                    "https://{}.{}.{}",
                    service.endpoint_prefix, region, domain
                )),
            };
        }

        Ok(format!(
            "https://{}.{}.{}",
            service.endpoint_prefix, region, domain
        ))
    }

    /// Determine the endpoint domain for a region (standard vs. sovereign)
    fn endpoint_domain(region: &str) -> &'static str {
        if region.starts_with(EUSC_PREFIX) {
            "amazonaws.eu"
        } else {
            "amazonaws.com"
        }
    }

    /// Make a Query protocol request (EC2, IAM, RDS, etc.)
    pub async fn query_request(
        &self,
        service: &ServiceDefinition,
        action: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse> {
        debug!(
            "Query request: service={}, action={}",
            service.signing_name, action
        );
        trace!("Query params: {:?}", params);

        let endpoint = self.get_endpoint(service)?;
        let url = format!("{}/", endpoint);

        let body = std::iter::once(("Action", action))
            .chain(std::iter::once(("Version", service.api_version)))
            .chain(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let headers = vec![(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded; charset=utf-8".to_string(),
        )];

        self.signed_request(service, "POST", &url, &body, headers)
            .await
    }

    /// Make a JSON protocol request (DynamoDB, ECS, Logs, etc.)
    pub async fn json_request(
        &self,
        service: &ServiceDefinition,
        target: &str,
        body: &str,
    ) -> Result<HttpResponse> {
        debug!(
            "JSON request: service={}, target={}",
            service.signing_name, target
        );
        trace!("JSON body: {}", body);

        let endpoint = self.get_endpoint(service)?;
        let url = format!("{}/", endpoint);

        let target_header = format!(
            "{}.{}",
            service.target_prefix.unwrap_or(service.signing_name),
            target
        );

        let headers = vec![
            ("X-Amz-Target".to_string(), target_header),
            (
                "Content-Type".to_string(),
                format!("application/x-amz-json-{}", service.json_version),
            ),
        ];

        self.signed_request(service, "POST", &url, body, headers)
            .await
    }

    /// Sign and send a request. Non-2xx statuses are returned, not raised.
    async fn signed_request(
        &self,
        service: &ServiceDefinition,
        method: &str,
        url: &str,
        body: &str,
        extra_headers: Vec<(String, String)>,
    ) -> Result<HttpResponse> {
        let region = self.effective_region(service);

        let parsed_url = url::Url::parse(url)?;
        let host = parsed_url
            .host_str()
            .ok_or_else(|| anyhow!("Invalid URL"))?;
        let host = match parsed_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let path_and_query = match parsed_url.query() {
            Some(query) => format!("{}?{}", parsed_url.path(), query),
            None => parsed_url.path().to_string(),
        };

        let mut headers = vec![("host".to_string(), host)];
        for (k, v) in &extra_headers {
            headers.push((k.to_lowercase(), v.clone()));
        }

        let creds = aws_credential_types::Credentials::new(
            &self.credentials.access_key_id,
            &self.credentials.secret_access_key,
            self.credentials.session_token.clone(),
            None,
            "aws-invoke",
        );
        let identity: Identity = creds.into();

        let signing_params = SigningParams::builder()
            .identity(&identity)
            .region(region)
            .name(service.signing_name)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()?
            .into();

        let signable_request = SignableRequest::new(
            method,
            &path_and_query,
            headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            SignableBody::Bytes(body.as_bytes()),
        )?;

        let (signing_instructions, _signature) =
            sign(signable_request, &signing_params)?.into_parts();

        let mut request = match method {
            "GET" => self.http_client.get(url),
            "POST" => self.http_client.post(url),
            _ => return Err(anyhow!("Unsupported HTTP method: {}", method)),
        };

        for (name, value) in signing_instructions.headers() {
            request = request.header(name.to_string(), value.to_string());
        }
        for (k, v) in extra_headers {
            request = request.header(&k, &v);
        }
        if !body.is_empty() {
            request = request.body(body.to_string());
        }

        trace!("Sending {} request to {}", method, url);
        let response = request.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!("Response status: {}", status);
        trace!(
            "Response body (first 2000 bytes): {}",
            String::from_utf8_lossy(&body[..body.len().min(2000)])
        );

        if !status.is_success() {
            warn!(
                "AWS request failed: status={}, body={}",
                status,
                String::from_utf8_lossy(&body[..body.len().min(500)])
            );
        }

        Ok(HttpResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

/// True when the error chain bottoms out in a transport failure
pub fn is_transport_error(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<reqwest::Error>().is_some())
}

/// Parse an XML document into JSON using quick-xml.
///
/// Repeated sibling elements become arrays, text-only elements become
/// strings and empty elements become null. Attributes are ignored.
pub fn xml_to_json(xml: &str) -> Result<serde_json::Value> {
    use quick_xml::escape::resolve_predefined_entity;
    use quick_xml::events::Event;
    use quick_xml::Reader;
    use serde_json::{Map, Value};

    fn parse_element(reader: &mut Reader<&[u8]>) -> Result<Value> {
        let mut map: Map<String, Value> = Map::new();
        let mut current_text = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    let child_value = parse_element(reader)?;
                    insert_child(&mut map, tag_name, child_value);
                }
                Ok(Event::Text(e)) => {
                    current_text.push_str(&e.xml_content().unwrap_or_default());
                }
                Ok(Event::CData(e)) => {
                    current_text.push_str(&String::from_utf8_lossy(&e));
                }
                // Entity references arrive as their own events
                Ok(Event::GeneralRef(e)) => {
                    if let Ok(Some(ch)) = e.resolve_char_ref() {
                        current_text.push(ch);
                    } else if let Ok(name) = e.decode() {
                        if let Some(text) = resolve_predefined_entity(&name) {
                            current_text.push_str(text);
                        }
                    }
                }
                Ok(Event::End(_)) => break,
                Ok(Event::Empty(e)) => {
                    let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    insert_child(&mut map, tag_name, Value::Null);
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(anyhow!("XML parse error: {}", e)),
                _ => {}
            }
        }

        let current_text = current_text.trim();
        if map.is_empty() {
            if current_text.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::String(current_text.to_string()))
            }
        } else {
            Ok(Value::Object(map))
        }
    }

    // Handle duplicate keys by converting to array
    fn insert_child(map: &mut Map<String, Value>, tag_name: String, child: Value) {
        if let Some(existing) = map.get_mut(&tag_name) {
            match existing {
                Value::Array(arr) => arr.push(child),
                _ => {
                    let old = existing.take();
                    *existing = Value::Array(vec![old, child]);
                }
            }
        } else {
            map.insert(tag_name, child);
        }
    }

    let mut reader = Reader::from_str(xml);

    let mut root_map: Map<String, Value> = Map::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let child_value = parse_element(&mut reader)?;
                root_map.insert(tag_name, child_value);
            }
            Ok(Event::Empty(e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                root_map.insert(tag_name, Value::Null);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(anyhow!("XML parse error: {}", e)),
        }
    }

    Ok(Value::Object(root_map))
}
