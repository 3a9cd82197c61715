use anyhow::{anyhow, bail, Context, Result};
use aws_invoke::{logging, InvocationRequest};
use clap::Parser;
use serde_json::{json, Map, Value};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "aws-invoke",
    version,
    about = "Invoke any AWS API operation by name",
    long_about = "Calls a query, ec2 or json protocol AWS operation with a loosely-typed parameter tree and prints the normalized response as JSON."
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "JSON request document, '-' for stdin")]
    request: Option<PathBuf>,

    #[arg(long, help = "Service to call (ec2, iam, dynamodb, ...)")]
    service: Option<String>,

    #[arg(long, help = "Method to call, e.g. describe_instances")]
    method: Option<String>,

    #[arg(long, value_name = "JSON", help = "Method parameters as a JSON object")]
    params: Option<String>,

    #[arg(long, value_parser = ["camel", "Pascal"], help = "Key case for outbound parameters")]
    convert_param_case: Option<String>,

    #[arg(long, help = "Keep digit-only strings as strings")]
    no_convert_to_integer: bool,

    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_key_val, help = "Tag to add (repeatable)")]
    tags: Vec<(String, String)>,

    #[arg(long = "filter", value_name = "NAME=VALUE", value_parser = parse_key_val, help = "Filter to add (repeatable)")]
    filters: Vec<(String, String)>,

    #[arg(long, help = "Keep the case of keys inside response tag maps")]
    preserve_tag_keys: bool,

    #[arg(long, help = "AWS region")]
    region: Option<String>,

    #[arg(long, help = "Profile from the shared config files")]
    profile: Option<String>,

    #[arg(long, help = "Custom endpoint for every service (LocalStack, ...)")]
    endpoint_url: Option<String>,

    #[arg(long, help = "Skip TLS certificate validation")]
    insecure: bool,

    #[arg(long, help = "Pretty-print the JSON output")]
    pretty: bool,

    #[arg(short, long, help = "Enable verbose logging on stderr")]
    verbose: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))
}

fn read_request_file(path: &PathBuf) -> Result<Map<String, Value>> {
    let text = if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read request from stdin")?;
        text
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file {}", path.display()))?
    };

    match serde_json::from_str::<Value>(&text).context("Request is not valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("Request must be a JSON object"),
    }
}

/// Request file first, then each flag given on the command line on top
fn build_request(cli: &Cli) -> Result<InvocationRequest> {
    let mut doc = match &cli.request {
        Some(path) => read_request_file(path)?,
        None => Map::new(),
    };

    let mut set = |names: &[&str], value: Value| {
        // Drop aliases so the override is the only spelling left
        for alias in &names[1..] {
            doc.remove(*alias);
        }
        doc.insert(names[0].to_string(), value);
    };
    if let Some(service) = &cli.service {
        set(&["service", "service_name"], json!(service));
    }
    if let Some(method) = &cli.method {
        set(&["method", "method_name", "action"], json!(method));
    }
    if let Some(params) = &cli.params {
        let params: Value = serde_json::from_str(params).context("--params is not valid JSON")?;
        if !params.is_object() {
            bail!("--params must be a JSON object");
        }
        set(&["params", "method_params"], params);
    }
    if let Some(case) = &cli.convert_param_case {
        set(&["convert_param_case"], json!(case));
    }
    if cli.no_convert_to_integer {
        set(&["convert_to_integer"], json!(false));
    }
    if cli.preserve_tag_keys {
        set(&["preserve_tag_keys"], json!(true));
    }
    if let Some(region) = &cli.region {
        set(&["region", "aws_region", "ec2_region"], json!(region));
    }
    if let Some(profile) = &cli.profile {
        set(&["profile", "aws_profile"], json!(profile));
    }
    if let Some(endpoint) = &cli.endpoint_url {
        set(&["endpoint_url", "ec2_url"], json!(endpoint));
    }
    if cli.insecure {
        set(&["validate_certs"], json!(false));
    }

    if !doc.contains_key("service") && !doc.contains_key("service_name") {
        return Err(anyhow!("missing service: pass --service or a request file"));
    }
    if !["method", "method_name", "action"].iter().any(|k| doc.contains_key(*k)) {
        return Err(anyhow!("missing method: pass --method or a request file"));
    }

    let mut request: InvocationRequest =
        serde_json::from_value(Value::Object(doc)).context("Invalid request")?;

    for (key, value) in &cli.tags {
        request.tags.insert(key.clone(), json!(value));
    }
    // Repeating a filter name collects its values
    for (name, value) in &cli.filters {
        match request.filters.get_mut(name) {
            Some(Value::Array(values)) => values.push(json!(value)),
            Some(existing) => *existing = json!([existing.clone(), value]),
            None => {
                request.filters.insert(name.clone(), json!(value));
            }
        }
    }

    Ok(request)
}

async fn invoke(cli: &Cli) -> Result<Value> {
    let request = build_request(cli)?;
    Ok(aws_invoke::run(&request).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let (output, code) = match invoke(&cli).await {
        Ok(response) => (response, ExitCode::SUCCESS),
        Err(err) => {
            tracing::debug!("Invocation failed: {:?}", err);
            (
                json!({"failed": true, "msg": format!("{:#}", err)}),
                ExitCode::FAILURE,
            )
        }
    };

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    };
    match rendered {
        Ok(text) => println!("{}", text),
        Err(err) => {
            eprintln!("Failed to render output: {}", err);
            return ExitCode::FAILURE;
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_invoke::KeyCase;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("aws-invoke").chain(args.iter().copied()))
    }

    #[test]
    fn test_build_request_from_flags() {
        let cli = cli(&[
            "--service", "ec2",
            "--method", "describe_instances",
            "--params", r#"{"max_results": "5"}"#,
            "--convert-param-case", "Pascal",
            "--filter", "instance-state-name=running",
            "--filter", "instance-state-name=stopped",
            "--tag", "Env=prod",
            "--region", "eu-west-1",
            "--insecure",
            "--preserve-tag-keys",
        ]);
        let request = build_request(&cli).unwrap();
        assert_eq!(request.service, "ec2");
        assert_eq!(request.convert_param_case, KeyCase::Pascal);
        assert_eq!(request.params["max_results"], json!("5"));
        assert_eq!(
            request.filters["instance-state-name"],
            json!(["running", "stopped"])
        );
        assert_eq!(request.tags["Env"], json!("prod"));
        assert_eq!(request.connection.region.as_deref(), Some("eu-west-1"));
        assert!(!request.connection.validate_certs);
        assert!(request.preserve_tag_keys);
    }

    #[test]
    fn test_flags_override_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(
            &path,
            r#"{"service_name": "iam", "method_name": "list_users", "aws_region": "us-west-2"}"#,
        )
        .unwrap();

        let path_arg = path.to_string_lossy().into_owned();
        let cli = cli(&["--request", &path_arg, "--region", "eu-central-1"]);
        let request = build_request(&cli).unwrap();
        assert_eq!(request.service, "iam");
        assert_eq!(request.method, "list_users");
        assert_eq!(request.connection.region.as_deref(), Some("eu-central-1"));
    }

    #[test]
    fn test_missing_method_is_rejected() {
        let err = build_request(&cli(&["--service", "ec2"])).unwrap_err();
        assert!(err.to_string().contains("missing method"));
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(parse_key_val("a=b=c").unwrap(), ("a".into(), "b=c".into()));
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }
}
