//! AWS credential and region resolution
//!
//! Sources, first match wins:
//! - Keys given explicitly on the request
//! - Environment variables (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY, AWS_SESSION_TOKEN)
//! - Shared credentials file (~/.aws/credentials or AWS_SHARED_CREDENTIALS_FILE)
//! - Shared config file (~/.aws/config or AWS_CONFIG_FILE)
//! - `credential_process` configured in either file

use crate::request::ConnectionConfig;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, trace};

/// AWS credentials
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &mask_credential(&self.access_key_id))
            .field("secret_access_key", &"****")
            .field("session_token", &self.session_token.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Mask sensitive credential values for logging
pub fn mask_credential(value: &str) -> String {
    if value.len() <= 8 {
        "*".repeat(value.len())
    } else {
        format!("{}...{}", &value[..4], &value[value.len() - 4..])
    }
}

/// Locations of the shared AWS files
#[derive(Debug, Clone)]
pub struct SharedFiles {
    pub credentials: PathBuf,
    pub config: PathBuf,
}

impl SharedFiles {
    /// Resolve file locations the way the AWS CLI does
    pub fn from_env() -> Result<Self> {
        let credentials = match env::var("AWS_SHARED_CREDENTIALS_FILE") {
            Ok(path) => PathBuf::from(path),
            Err(_) => aws_config_dir()?.join("credentials"),
        };
        let config = match env::var("AWS_CONFIG_FILE") {
            Ok(path) => PathBuf::from(path),
            Err(_) => aws_config_dir()?.join("config"),
        };
        Ok(Self {
            credentials,
            config,
        })
    }
}

/// Get AWS config directory
pub fn aws_config_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|h| h.join(".aws"))
        .ok_or_else(|| anyhow!("Could not find home directory"))
}

/// Resolve credentials for a connection
pub fn resolve_credentials(config: &ConnectionConfig) -> Result<Credentials> {
    if let Some(creds) = explicit_credentials(config)? {
        debug!("Using credentials supplied with the request");
        return Ok(creds);
    }

    let profile = config.profile_name();

    // Environment only applies when no named profile was asked for
    if config.profile.is_none() {
        if let Ok(creds) = load_from_env() {
            debug!("Loaded credentials from environment variables");
            return Ok(creds);
        }
    }

    let files = SharedFiles::from_env()?;
    load_from_shared_files(&files, profile)
}

fn explicit_credentials(config: &ConnectionConfig) -> Result<Option<Credentials>> {
    match (&config.aws_access_key, &config.aws_secret_key) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Some(Credentials {
            access_key_id: access_key_id.clone(),
            secret_access_key: secret_access_key.clone(),
            session_token: config.security_token.clone(),
        })),
        (None, None) => Ok(None),
        _ => Err(anyhow!(
            "aws_access_key and aws_secret_key must be given together"
        )),
    }
}

/// Load credentials from environment variables
fn load_from_env() -> Result<Credentials> {
    let access_key_id =
        env::var("AWS_ACCESS_KEY_ID").map_err(|_| anyhow!("AWS_ACCESS_KEY_ID not set"))?;
    let secret_access_key =
        env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| anyhow!("AWS_SECRET_ACCESS_KEY not set"))?;
    let session_token = env::var("AWS_SESSION_TOKEN").ok();

    Ok(Credentials {
        access_key_id,
        secret_access_key,
        session_token,
    })
}

/// Try the shared credentials file, then the shared config file
pub fn load_from_shared_files(files: &SharedFiles, profile: &str) -> Result<Credentials> {
    match load_from_file(&files.credentials, profile) {
        Ok(creds) => {
            debug!(
                "Loaded credentials from credentials file for profile '{}'",
                profile
            );
            return Ok(creds);
        }
        Err(e) => trace!("Credentials file lookup failed: {}", e),
    }

    match load_from_file(&files.config, profile) {
        Ok(creds) => {
            debug!("Loaded credentials from config file for profile '{}'", profile);
            Ok(creds)
        }
        Err(e) => {
            trace!("Config file lookup failed: {}", e);
            Err(anyhow!(
                "No credentials found for profile '{}'. Run 'aws configure' or set AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY",
                profile
            ))
        }
    }
}

/// Parse an INI-style file into sections.
///
/// `[profile name]` headers (config file style) are stored under `name`.
pub fn parse_ini_file(content: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current_section = String::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            current_section = line[1..line.len() - 1].trim().to_string();
            if let Some(name) = current_section.strip_prefix("profile ") {
                current_section = name.trim().to_string();
            }
            sections.entry(current_section.clone()).or_default();
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            if !current_section.is_empty() {
                sections
                    .entry(current_section.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    sections
}

fn load_from_file(path: &Path, profile: &str) -> Result<Credentials> {
    let content = fs::read_to_string(path).map_err(|_| anyhow!("Could not read {:?}", path))?;
    let sections = parse_ini_file(&content);

    let section = sections
        .get(profile)
        .ok_or_else(|| anyhow!("Profile '{}' not found in {:?}", profile, path))?;

    if let Some(command) = section.get("credential_process") {
        debug!("Found credential_process for profile '{}'", profile);
        return execute_credential_process(command);
    }

    let access_key_id = section
        .get("aws_access_key_id")
        .ok_or_else(|| anyhow!("aws_access_key_id not found for profile '{}'", profile))?
        .clone();

    let secret_access_key = section
        .get("aws_secret_access_key")
        .ok_or_else(|| anyhow!("aws_secret_access_key not found for profile '{}'", profile))?
        .clone();

    Ok(Credentials {
        access_key_id,
        secret_access_key,
        session_token: section.get("aws_session_token").cloned(),
    })
}

fn execute_credential_process(command: &str) -> Result<Credentials> {
    debug!("Executing credential_process: {}", command);

    #[cfg(not(windows))]
    let shell_cmd = Command::new("sh").arg("-c").arg(command).output();

    #[cfg(windows)]
    let shell_cmd = Command::new("cmd").arg("/C").arg(command).output();

    let output = shell_cmd.map_err(|e| anyhow!("Failed to execute credential_process: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "credential_process failed with status {}: {}",
            output.status,
            stderr
        ));
    }

    let json: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| anyhow!("Failed to parse credential_process output: {}", e))?;

    if let Some(version) = json.get("Version").and_then(|v| v.as_i64()) {
        if version != 1 {
            return Err(anyhow!(
                "Unsupported credential_process version: {}",
                version
            ));
        }
    }

    let field = |name: &str| json.get(name).and_then(|v| v.as_str()).map(str::to_string);

    Ok(Credentials {
        access_key_id: field("AccessKeyId")
            .ok_or_else(|| anyhow!("AccessKeyId missing in credential_process output"))?,
        secret_access_key: field("SecretAccessKey")
            .ok_or_else(|| anyhow!("SecretAccessKey missing in credential_process output"))?,
        session_token: field("SessionToken"),
    })
}

/// Resolve the region for a connection: request, environment, then profile
pub fn resolve_region(config: &ConnectionConfig) -> Option<String> {
    if let Some(region) = config.region.as_ref().filter(|r| !r.is_empty()) {
        return Some(region.clone());
    }
    if let Ok(region) = env::var("AWS_REGION") {
        return Some(region);
    }
    if let Ok(region) = env::var("AWS_DEFAULT_REGION") {
        return Some(region);
    }

    let files = SharedFiles::from_env().ok()?;
    profile_region(&files.config, config.profile_name())
}

/// Read the `region` key of a profile from a config file
pub fn profile_region(config_path: &Path, profile: &str) -> Option<String> {
    let content = fs::read_to_string(config_path).ok()?;
    parse_ini_file(&content)
        .get(profile)
        .and_then(|section| section.get("region"))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parse_ini_file() {
        let content = r#"
[default]
aws_access_key_id = AKIADEFAULT
aws_secret_access_key = secret_default

# comment
[profile dev]
aws_access_key_id = AKIADEV
aws_secret_access_key = secret_dev
region = eu-central-1
"#;
        let sections = parse_ini_file(content);

        assert!(sections.contains_key("default"));
        assert!(sections.contains_key("dev"));
        assert_eq!(
            sections["default"].get("aws_access_key_id").unwrap(),
            "AKIADEFAULT"
        );
        assert_eq!(sections["dev"].get("region").unwrap(), "eu-central-1");
    }

    #[test]
    fn test_explicit_keys_win() {
        let config = ConnectionConfig {
            aws_access_key: Some("AKIAEXPLICIT".into()),
            aws_secret_key: Some("secret".into()),
            security_token: Some("token".into()),
            ..Default::default()
        };
        let creds = resolve_credentials(&config).unwrap();
        assert_eq!(creds.access_key_id, "AKIAEXPLICIT");
        assert_eq!(creds.session_token.as_deref(), Some("token"));
    }

    #[test]
    fn test_half_explicit_keys_rejected() {
        let config = ConnectionConfig {
            aws_access_key: Some("AKIAEXPLICIT".into()),
            ..Default::default()
        };
        assert!(resolve_credentials(&config).is_err());
    }

    #[test]
    fn test_shared_files_fallback_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = write_file(
            &dir,
            "credentials",
            "[default]\naws_access_key_id = AKIADEFAULT\naws_secret_access_key = s\n",
        );
        let config = write_file(
            &dir,
            "config",
            "[profile ops]\naws_access_key_id = AKIAOPS\naws_secret_access_key = s2\naws_session_token = t\n",
        );
        let files = SharedFiles {
            credentials,
            config,
        };

        let creds = load_from_shared_files(&files, "default").unwrap();
        assert_eq!(creds.access_key_id, "AKIADEFAULT");

        let creds = load_from_shared_files(&files, "ops").unwrap();
        assert_eq!(creds.access_key_id, "AKIAOPS");
        assert_eq!(creds.session_token.as_deref(), Some("t"));

        let err = load_from_shared_files(&files, "missing").unwrap_err();
        assert!(err.to_string().contains("No credentials found for profile 'missing'"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_credential_process() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{"Version": 1, "AccessKeyId": "proc_key", "SecretAccessKey": "proc_secret", "SessionToken": "proc_token"}"#;
        let credentials = write_file(
            &dir,
            "credentials",
            &format!("[proc]\ncredential_process = echo '{}'\n", json),
        );
        let files = SharedFiles {
            credentials,
            config: dir.path().join("absent"),
        };

        let creds = load_from_shared_files(&files, "proc").unwrap();
        assert_eq!(creds.access_key_id, "proc_key");
        assert_eq!(creds.secret_access_key, "proc_secret");
        assert_eq!(creds.session_token.as_deref(), Some("proc_token"));
    }

    #[test]
    fn test_profile_region() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_file(&dir, "config", "[profile dev]\nregion = ap-south-1\n");
        assert_eq!(profile_region(&config, "dev").as_deref(), Some("ap-south-1"));
        assert_eq!(profile_region(&config, "default"), None);
    }

    #[test]
    fn test_request_region_wins() {
        let config = ConnectionConfig {
            region: Some("us-west-2".into()),
            ..Default::default()
        };
        assert_eq!(resolve_region(&config).as_deref(), Some("us-west-2"));
    }

    #[test]
    fn test_debug_masks_secrets() {
        let creds = Credentials {
            access_key_id: "AKIAABCDEFGHIJKL".into(),
            secret_access_key: "supersecret".into(),
            session_token: None,
        };
        let text = format!("{:?}", creds);
        assert!(text.contains("AKIA...IJKL"));
        assert!(!text.contains("supersecret"));
    }
}
