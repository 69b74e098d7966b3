//! Configuration Management
//!
//! Run settings for gcp-inventory: file locations, the concurrency budget for
//! zone scans, retry policy and API endpoints. Values come from an optional
//! YAML file and are overridden by command-line flags in `main`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default prefix of compute instances owned by a GKE node pool
pub const DEFAULT_MANAGED_NODE_PREFIX: &str = "gke";

/// Retry policy for transient API failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first one
    pub max_attempts: u32,
    /// Backoff before the second attempt, in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for a single backoff, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

/// Base URLs of the Google APIs we talk to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    pub resource_manager: String,
    pub compute: String,
    pub container: String,
    pub sql_admin: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            resource_manager: "https://cloudresourcemanager.googleapis.com".to_string(),
            compute: "https://compute.googleapis.com".to_string(),
            container: "https://container.googleapis.com".to_string(),
            sql_admin: "https://sqladmin.googleapis.com".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every API at the same base URL (used against a mock server)
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            resource_manager: base.clone(),
            compute: base.clone(),
            container: base.clone(),
            sql_admin: base,
        }
    }
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding `token.json` and `client_secrets.json`
    pub credentials_dir: Option<PathBuf>,
    /// Directory receiving the CSV exports
    pub output_dir: Option<PathBuf>,
    /// Directory receiving the log files
    pub log_dir: Option<PathBuf>,
    /// Maximum number of zone listings in flight at once
    pub max_concurrency: usize,
    /// Deadline for one zone listing, in seconds
    pub zone_timeout_secs: u64,
    /// Deadline for one HTTP request, in seconds
    pub request_timeout_secs: u64,
    /// How long to wait for the browser consent redirect, in seconds
    pub consent_timeout_secs: u64,
    /// Instances whose name starts with this prefix are left out of VM listings
    pub managed_node_prefix: String,
    /// Project IDs never scanned
    pub excluded_projects: Vec<String>,
    pub retry: RetryConfig,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_dir: None,
            output_dir: None,
            log_dir: None,
            max_concurrency: 16,
            zone_timeout_secs: 60,
            request_timeout_secs: 30,
            consent_timeout_secs: 300,
            managed_node_prefix: DEFAULT_MANAGED_NODE_PREFIX.to_string(),
            excluded_projects: Vec::new(),
            retry: RetryConfig::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gcp-inventory").join("config.yaml"))
    }

    /// Load configuration from disk.
    ///
    /// An explicitly requested file must exist and parse. The default file is
    /// optional; if it is broken we fall back to defaults and hand back the
    /// reason, since logging is not set up yet when the config is read.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<String>)> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, None));
        }

        Ok(match Self::default_path() {
            Some(path) => Self::load_optional(&path),
            None => (Self::default(), None),
        })
    }

    fn load_optional(path: &Path) -> (Self, Option<String>) {
        if !path.exists() {
            return (Self::default(), None);
        }

        match Self::from_file(path) {
            Ok(config) => (config, None),
            Err(e) => (
                Self::default(),
                Some(format!("Ignoring config file {}: {:#}", path.display(), e)),
            ),
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        if config.max_concurrency == 0 {
            anyhow::bail!("max_concurrency must be at least 1");
        }
        if config.zone_timeout_secs == 0 {
            anyhow::bail!("zone_timeout_secs must be at least 1");
        }
        Ok(config)
    }

    /// Directory holding the credential files
    pub fn credentials_dir(&self) -> PathBuf {
        if let Some(dir) = &self.credentials_dir {
            return dir.clone();
        }
        if let Some(config_dir) = dirs::config_dir() {
            return config_dir.join("gcp-inventory").join("credentials");
        }
        PathBuf::from("credentials")
    }

    /// Path of the cached user credential
    pub fn token_path(&self) -> PathBuf {
        self.credentials_dir().join("token.json")
    }

    /// Path of the OAuth client-secret file
    pub fn client_secrets_path(&self) -> PathBuf {
        self.credentials_dir().join("client_secrets.json")
    }

    /// CSV file for a listing, e.g. `csv/vm.csv`
    pub fn output_path(&self, listing: &str) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("csv"))
            .join(format!("{}.csv", listing))
    }

    /// Log file for a listing, e.g. `log/vm.log`
    pub fn log_path(&self, listing: &str) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("log"))
            .join(format!("{}.log", listing))
    }

    pub fn zone_timeout(&self) -> Duration {
        Duration::from_secs(self.zone_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn consent_timeout(&self) -> Duration {
        Duration::from_secs(self.consent_timeout_secs)
    }

    /// Whether a project is on the exclusion list
    pub fn is_excluded(&self, project_id: &str) -> bool {
        self.excluded_projects.iter().any(|p| p == project_id)
    }
}
