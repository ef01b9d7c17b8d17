use crate::error::Error;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// API server address
    #[serde(default = "default_address")]
    pub address: String,
    /// API server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory holding the HTML pages and the `static/` assets
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
    /// Largest accepted request body, in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_max_upload_mb() -> usize {
    10
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Connection pool max size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Automatic migration on startup
    #[serde(default = "default_true")]
    pub auto_migrate: bool,
}

fn default_db_url() -> String {
    "sqlite://potholes.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

/// Scratch directories for uploads and generated reports
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

/// External detection provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    /// Base URL of the inference provider
    #[serde(default = "default_api_url")]
    pub api_url: Url,
    /// Provider credential. Usually left out of the file and read from `api_key_env`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Environment variable holding the credential
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Label reported back to clients as the detection source
    #[serde(default = "default_source_label")]
    pub source_label: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Retries for transient provider failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial retry delay in milliseconds, doubled on every attempt
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Which provider API shape to call
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Workflow endpoint, answers with `outputs[0].predictions`
    Workflow {
        workspace: String,
        workflow_id: String,
        #[serde(default = "default_true")]
        use_cache: bool,
    },
    /// Hosted model endpoint, answers with top-level `predictions`
    Model {
        model_id: String,
        version: u32,
        /// Minimum confidence in percent, passed through to the provider
        #[serde(default)]
        confidence: Option<u8>,
    },
}

fn default_api_url() -> Url {
    Url::parse("https://serverless.roboflow.com").expect("static URL is valid")
}

fn default_api_key_env() -> String {
    "ROBOFLOW_API_KEY".to_string()
}

fn default_source_label() -> String {
    "Roboflow API".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff() -> u64 {
    500
}

impl DetectionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            log_level: default_log_level(),
            public_dir: default_public_dir(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
            auto_migrate: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            report_dir: default_report_dir(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Workflow {
            workspace: "adi-work".to_string(),
            workflow_id: "detect-count-and-visualize".to_string(),
            use_cache: true,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            source_label: default_source_label(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            transport: TransportConfig::default(),
        }
    }
}

impl Config {
    /// Fill the provider credential from the environment if the file did not set one.
    pub fn resolve_secrets(&mut self) -> Result<()> {
        self.resolve_secrets_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_secrets_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let configured = self
            .detection
            .api_key
            .as_deref()
            .map_or(false, |key| !key.trim().is_empty());
        if configured {
            return Ok(());
        }

        match lookup(&self.detection.api_key_env) {
            Some(key) if !key.trim().is_empty() => {
                self.detection.api_key = Some(key);
                Ok(())
            }
            _ => Err(Error::ConfigurationMissing(format!(
                "detection provider API key not set; export {}",
                self.detection.api_key_env
            ))
            .into()),
        }
    }
}

/// Load configuration from a file or use default
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => {
            let config_str = std::fs::read_to_string(path)
                .context(format!("Failed to read config file: {:?}", path))?;

            let config = if path.extension().map_or(false, |ext| ext == "json") {
                serde_json::from_str(&config_str).context("Failed to parse JSON config")?
            } else if path.extension().map_or(false, |ext| ext == "toml") {
                toml::from_str(&config_str).context("Failed to parse TOML config")?
            } else {
                return Err(anyhow::anyhow!("Unsupported config file format"));
            };

            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_hosted_roboflow_deployment() {
        let config = Config::default();
        assert_eq!(config.api.port, 5000);
        assert_eq!(config.detection.api_url.as_str(), "https://serverless.roboflow.com/");
        assert_eq!(config.detection.source_label, "Roboflow API");
        assert_eq!(
            config.detection.transport,
            TransportConfig::Workflow {
                workspace: "adi-work".to_string(),
                workflow_id: "detect-count-and-visualize".to_string(),
                use_cache: true,
            }
        );
    }

    #[test]
    fn parses_toml_with_model_transport() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[api]
port = 8080

[database]
url = "sqlite::memory:"

[detection]
api_url = "https://detect.roboflow.com"
request_timeout_secs = 5

[detection.transport]
kind = "model"
model_id = "pothole-detection"
version = 3
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.address, "0.0.0.0");
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.detection.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.detection.max_retries, 2);
        assert_eq!(
            config.detection.transport,
            TransportConfig::Model {
                model_id: "pothole-detection".to_string(),
                version: 3,
                confidence: None,
            }
        );
    }

    #[test]
    fn rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let mut config = Config::default();
        let err = config.resolve_secrets_with(|_| None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::ConfigurationMissing(_))
        ));

        let err = config
            .resolve_secrets_with(|_| Some("   ".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("ROBOFLOW_API_KEY"));
    }

    #[test]
    fn api_key_is_read_from_named_variable() {
        let mut config = Config::default();
        config.detection.api_key_env = "POTHOLE_KEY".to_string();
        config
            .resolve_secrets_with(|name| (name == "POTHOLE_KEY").then(|| "secret".to_string()))
            .unwrap();
        assert_eq!(config.detection.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn key_from_file_wins_over_environment() {
        let mut config = Config::default();
        config.detection.api_key = Some("from-file".to_string());
        config
            .resolve_secrets_with(|_| Some("from-env".to_string()))
            .unwrap();
        assert_eq!(config.detection.api_key.as_deref(), Some("from-file"));
    }
}
