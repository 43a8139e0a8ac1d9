//! Configuration module for the export workflow

use crate::core::{ExportFormat, ScanId, TemplateId};
use crate::error::{ExportError, ExportResult};
use crate::poll::Poller;
use crate::workflow::ExportJob;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Name of the per-user configuration file
pub const CONFIG_FILE_NAME: &str = ".nessie-export.toml";

/// Connection descriptor for the scanning service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the service API
    pub api_url: String,

    /// Pinned SPKI fingerprints (base64 SHA-256); enables pinning mode
    pub fingerprints: Vec<String>,

    /// Accept any server certificate
    pub insecure: bool,

    /// Extra PEM root certificate to trust
    pub ca_cert: Option<PathBuf>,

    /// Timeout for each HTTP request in seconds
    pub request_timeout: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_url: "https://localhost:8834".to_string(),
            fingerprints: Vec::new(),
            insecure: false,
            ca_cert: None,
            request_timeout: 30,
        }
    }
}

impl ServiceConfig {
    /// Create a new service configuration
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Default::default()
        }
    }

    /// Pin the server's public key fingerprints
    pub fn with_fingerprints(mut self, fingerprints: Vec<String>) -> Self {
        self.fingerprints = fingerprints;
        self
    }

    /// Accept any certificate
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Trust an extra root certificate
    pub fn with_ca_cert(mut self, path: PathBuf) -> Self {
        self.ca_cert = Some(path);
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout = seconds;
        self
    }

    /// Get request timeout as Duration
    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Parse the base URL, normalised to end with a slash so joins keep its path
    pub fn base_url(&self) -> ExportResult<Url> {
        let mut raw = self.api_url.trim().to_string();
        if raw.is_empty() {
            return Err(ExportError::ConfigError("API URL cannot be empty".to_string()));
        }
        if !raw.ends_with('/') {
            raw.push('/');
        }

        let url = Url::parse(&raw)
            .map_err(|e| ExportError::ConfigError(format!("Invalid API URL '{}': {}", self.api_url, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ExportError::ConfigError(format!(
                "Unsupported URL scheme '{}', expected http or https",
                other
            ))),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ExportResult<()> {
        let url = self.base_url()?;

        if !self.fingerprints.is_empty() && url.scheme() != "https" {
            return Err(ExportError::ConfigError(
                "Fingerprint pinning requires an https API URL".to_string(),
            ));
        }

        if self.request_timeout == 0 {
            return Err(ExportError::ConfigError(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// What to export and how to wait for it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Scan to launch
    pub scan_id: Option<i64>,

    /// Report template for the export
    pub template_id: Option<i64>,

    /// Export format
    pub format: ExportFormat,

    /// Seconds between status polls
    pub poll_interval: u64,

    /// Give up waiting after this many seconds (per wait)
    pub max_wait: Option<u64>,

    /// Where to write the artifact
    pub output: Option<PathBuf>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            scan_id: None,
            template_id: None,
            format: ExportFormat::Csv,
            poll_interval: 5,
            max_wait: None,
            output: None,
        }
    }
}

impl WorkflowConfig {
    /// Validate the configuration
    pub fn validate(&self) -> ExportResult<()> {
        match self.scan_id {
            None => {
                return Err(ExportError::ConfigError("No scan id specified".to_string()));
            }
            Some(id) if id <= 0 => {
                return Err(ExportError::ConfigError(format!("Invalid scan id: {}", id)));
            }
            _ => {}
        }

        if self.poll_interval == 0 {
            return Err(ExportError::ConfigError(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.max_wait == Some(0) {
            return Err(ExportError::ConfigError(
                "Maximum wait must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the export job described by this configuration
    pub fn job(&self) -> ExportResult<ExportJob> {
        self.validate()?;
        let scan_id = self
            .scan_id
            .ok_or_else(|| ExportError::ConfigError("No scan id specified".to_string()))?;

        Ok(ExportJob {
            scan_id: ScanId(scan_id),
            template_id: self.template_id.map(TemplateId),
            format: self.format,
        })
    }

    /// Build the poller for both waits
    pub fn poller(&self, cancel: CancellationToken) -> Poller {
        let poller = Poller::default()
            .with_interval(Duration::from_secs(self.poll_interval))
            .with_cancellation(cancel);
        match self.max_wait {
            Some(seconds) => poller.with_deadline(Duration::from_secs(seconds)),
            None => poller,
        }
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub workflow: WorkflowConfig,
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ExportResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ExportError::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ExportResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Default location: `~/.nessie-export.toml`
    pub fn default_path() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(CONFIG_FILE_NAME)
    }

    /// Load configuration from the default location, falling back to defaults
    pub fn load_default_config() -> ExportResult<Self> {
        let path = Self::default_path();

        if path.exists() {
            let config = Self::from_toml_file(&path)?;
            log::info!("Loaded config from {}", path.display());
            return Ok(config);
        }

        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ExportResult<()> {
        self.service.validate()?;
        self.workflow.validate()
    }
}
