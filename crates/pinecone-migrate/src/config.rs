//! Configuration types for pinecone-migrate.
//!
//! The engine never reads the environment or prompts; it takes a fully
//! resolved [`MigrationConfig`]. The CLI assembles one either from a YAML
//! file or from positional index names plus API keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::IndexSpec;
use crate::retry::RetryConfig;

/// Default Pinecone control-plane endpoint.
pub const DEFAULT_CONTROLLER_URL: &str = "https://api.pinecone.io";

/// Pinecone REST API version sent with every request.
pub const DEFAULT_API_VERSION: &str = "2024-07";

/// Default checkpoint file, relative to the working directory.
pub const DEFAULT_CHECKPOINT_PATH: &str = ".pinecone-migrate/checkpoints.json";

/// Main migration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Where vectors are read from.
    pub source: StoreConfig,
    /// Where vectors are written to.
    pub destination: StoreConfig,
    /// Defaults used when the destination index must be created.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    /// Migration options.
    #[serde(default)]
    pub options: MigrationOptions,
}

/// Connection context of one side of the migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreConfig {
    /// A Pinecone index.
    #[serde(rename = "pinecone")]
    Pinecone(PineconeConfig),
    /// A local JSON snapshot file.
    #[serde(rename = "snapshot")]
    Snapshot(SnapshotConfig),
}

impl StoreConfig {
    /// Index name used in logs, reports and checkpoint keys.
    #[must_use]
    pub fn index_name(&self) -> String {
        match self {
            Self::Pinecone(cfg) => cfg.index.clone(),
            Self::Snapshot(cfg) => cfg.index_name(),
        }
    }
}

/// Pinecone connection context.
#[derive(Clone, Serialize, Deserialize)]
pub struct PineconeConfig {
    /// Index name.
    pub index: String,
    /// API key. May be left empty in files and supplied by the CLI.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Environment or region label, informational.
    #[serde(default)]
    pub environment: Option<String>,
    /// Data-plane host. Resolved through `describe_index` when absent.
    #[serde(default)]
    pub host: Option<String>,
    /// Control-plane URL.
    #[serde(default = "default_controller_url")]
    pub controller_url: String,
    /// API version header value.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Client-side request quota shared by all workers on this index.
    #[serde(default)]
    pub max_requests_per_second: Option<u32>,
}

impl PineconeConfig {
    /// Connection context with default endpoints.
    pub fn new(index: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            api_key: api_key.into(),
            environment: None,
            host: None,
            controller_url: default_controller_url(),
            api_version: default_api_version(),
            max_requests_per_second: None,
        }
    }
}

// Credentials never reach logs.
impl fmt::Debug for PineconeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PineconeConfig")
            .field("index", &self.index)
            .field("api_key", &"<redacted>")
            .field("environment", &self.environment)
            .field("host", &self.host)
            .field("controller_url", &self.controller_url)
            .field("api_version", &self.api_version)
            .field("max_requests_per_second", &self.max_requests_per_second)
            .finish()
    }
}

/// JSON snapshot file context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Path to the snapshot file. Created on first write when absent.
    pub path: PathBuf,
    /// Logical index name; defaults to the file stem.
    #[serde(default)]
    pub index: Option<String>,
}

impl SnapshotConfig {
    /// Logical index name of the snapshot.
    #[must_use]
    pub fn index_name(&self) -> String {
        self.index.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "snapshot".to_string())
        })
    }
}

/// Placement used when the destination index has to be created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Cloud provider.
    #[serde(default = "default_cloud")]
    pub cloud: String,
    /// Cloud region.
    #[serde(default = "default_region")]
    pub region: String,
    /// How long to wait for a new index to become ready.
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    /// Interval between readiness polls.
    #[serde(default = "default_ready_poll_secs")]
    pub ready_poll_interval_secs: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            cloud: default_cloud(),
            region: default_region(),
            ready_timeout_secs: default_ready_timeout_secs(),
            ready_poll_interval_secs: default_ready_poll_secs(),
        }
    }
}

impl ProvisioningConfig {
    /// Capacity spec for a newly created destination.
    #[must_use]
    pub fn index_spec(&self) -> IndexSpec {
        IndexSpec::Serverless {
            cloud: self.cloud.clone(),
            region: self.region.clone(),
        }
    }

    /// Readiness timeout.
    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// Readiness poll interval.
    #[must_use]
    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_secs(self.ready_poll_interval_secs)
    }
}

/// Backoff settings as written in config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay in milliseconds; doubles on each retry.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryOptions {
    /// Runtime retry policy.
    #[must_use]
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            ..RetryConfig::default()
        }
    }
}

/// Migration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Ids per page, and therefore per fetch+upsert round trip.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Namespaces migrated concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Fetched pages allowed to wait for their upsert.
    #[serde(default = "default_prefetch_pages")]
    pub prefetch_pages: usize,
    /// Enable checkpoint/resume support.
    #[serde(default = "default_true")]
    pub checkpoint_enabled: bool,
    /// Checkpoint file path.
    pub checkpoint_path: Option<PathBuf>,
    /// Discard stored checkpoints for the destination before running.
    #[serde(default)]
    pub reset_checkpoints: bool,
    /// Backoff policy for store calls.
    #[serde(default)]
    pub retry: RetryOptions,
    /// Error messages kept per namespace in the report.
    #[serde(default = "default_error_sample_limit")]
    pub error_sample_limit: usize,
    /// Restrict the run to these namespaces (empty = all).
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Dry run mode (read everything, write nothing).
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            prefetch_pages: default_prefetch_pages(),
            checkpoint_enabled: true,
            checkpoint_path: None,
            reset_checkpoints: false,
            retry: RetryOptions::default(),
            error_sample_limit: default_error_sample_limit(),
            namespaces: Vec::new(),
            dry_run: false,
        }
    }
}

impl MigrationOptions {
    /// Checkpoint file to use, if checkpoints are enabled.
    #[must_use]
    pub fn resolved_checkpoint_path(&self) -> Option<PathBuf> {
        if !self.checkpoint_enabled {
            return None;
        }
        Some(
            self.checkpoint_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_PATH)),
        )
    }
}

fn default_controller_url() -> String {
    DEFAULT_CONTROLLER_URL.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_cloud() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_ready_timeout_secs() -> u64 {
    300
}

fn default_ready_poll_secs() -> u64 {
    2
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_batch_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    4
}

fn default_prefetch_pages() -> usize {
    1
}

fn default_error_sample_limit() -> usize {
    5
}

fn default_true() -> bool {
    true
}

/// Strips quotes and whitespace that `.env` loaders sometimes leave around keys.
#[must_use]
pub fn sanitize_api_key(raw: &str) -> String {
    raw.replace(['"', '\''], "").trim().to_string()
}

impl MigrationConfig {
    /// Pinecone-to-Pinecone configuration with default options.
    pub fn between_indexes(
        source_index: impl Into<String>,
        source_api_key: impl Into<String>,
        destination_index: impl Into<String>,
        destination_api_key: impl Into<String>,
    ) -> Self {
        Self {
            source: StoreConfig::Pinecone(PineconeConfig::new(source_index, source_api_key)),
            destination: StoreConfig::Pinecone(PineconeConfig::new(
                destination_index,
                destination_api_key,
            )),
            provisioning: ProvisioningConfig::default(),
            options: MigrationOptions::default(),
        }
    }

    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Fills empty API keys from the given values (typically env vars).
    pub fn apply_api_keys(&mut self, source_key: Option<&str>, destination_key: Option<&str>) {
        for (side, key) in [
            (&mut self.source, source_key),
            (&mut self.destination, destination_key),
        ] {
            if let (StoreConfig::Pinecone(cfg), Some(key)) = (side, key) {
                if cfg.api_key.is_empty() {
                    cfg.api_key = sanitize_api_key(key);
                }
            }
        }
    }

    /// Validates only the source side, for read-only commands.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is not usable.
    pub fn validate_source(&self) -> Result<()> {
        validate_store("source", &self.source)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        validate_store("source", &self.source)?;
        validate_store("destination", &self.destination)?;

        let options = &self.options;
        if options.batch_size == 0 || options.batch_size > 1000 {
            return Err(Error::Config(
                "batch_size must be between 1 and 1000".to_string(),
            ));
        }
        if options.concurrency == 0 {
            return Err(Error::Config(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        if options.prefetch_pages == 0 {
            return Err(Error::Config(
                "prefetch_pages must be greater than 0".to_string(),
            ));
        }
        if options.retry.initial_delay_ms > options.retry.max_delay_ms {
            return Err(Error::Config(
                "retry.initial_delay_ms cannot exceed retry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_store(side: &str, store: &StoreConfig) -> Result<()> {
    match store {
        StoreConfig::Pinecone(cfg) => {
            if cfg.index.trim().is_empty() {
                return Err(Error::Config(format!("{side} index name cannot be empty")));
            }
            if cfg.api_key.is_empty() {
                return Err(Error::Config(format!("{side} API key is missing")));
            }
            if cfg.max_requests_per_second == Some(0) {
                return Err(Error::Config(format!(
                    "{side} max_requests_per_second must be greater than 0"
                )));
            }
        }
        StoreConfig::Snapshot(cfg) => {
            if cfg.path.as_os_str().is_empty() {
                return Err(Error::Config(format!("{side} snapshot path cannot be empty")));
            }
        }
    }
    Ok(())
}

/// Example configuration written by `pinecone-migrate init`.
pub const EXAMPLE_CONFIG: &str = r#"# pinecone-migrate configuration
#
# API keys may be left out here and supplied through
# PINECONE_SOURCE_API_KEY / PINECONE_DEST_API_KEY.

source:
  type: pinecone
  index: my-source-index

destination:
  type: pinecone
  index: my-destination-index
  # max_requests_per_second: 50

provisioning:
  cloud: aws
  region: us-east-1

options:
  batch_size: 100
  concurrency: 4
  checkpoint_enabled: true
  # checkpoint_path: ./.pinecone-migrate/checkpoints.json
  retry:
    max_retries: 5
    initial_delay_ms: 500
    max_delay_ms: 30000
  # namespaces: ["", "docs"]
"#;
