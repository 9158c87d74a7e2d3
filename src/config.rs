//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::keys::{EncodingError, KeyEncoder};
use crate::pipeline::InclusionPredicate;
use crate::service::{IndexFilter, ServiceConfig};
use crate::store::{ComparisonOp, SyncMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub service: ServiceSection,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Key schemas added to (or replacing) the built-in ones
    #[serde(default)]
    pub schemas: Vec<SchemaConfig>,

    /// Inclusion predicates applied when a batch brings none
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

/// Index storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub sync_mode: SyncMode,

    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_flush_interval() -> u64 {
    5000 // 5 seconds
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sync_mode: SyncMode::default(),
            flush_interval_ms: default_flush_interval(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Batches buffered per streaming connection
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8083
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_batch_size() -> usize {
    10_000
}

fn default_stream_buffer() -> usize {
    16
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            request_timeout_secs: default_request_timeout(),
            max_batch_size: default_max_batch_size(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

/// Service core configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    /// Deadline for one search or insert batch (0 disables it)
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,
}

fn default_operation_timeout() -> u64 {
    30_000
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            operation_timeout_ms: default_operation_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

/// `[[schemas]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    pub name: String,
    pub template: String,
}

/// `[[filters]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Index id or name
    pub index: String,
    #[serde(default)]
    pub network: Option<String>,
    pub field: String,
    pub op: ComparisonOp,
    pub threshold: f64,
}

impl FilterConfig {
    pub fn predicate(&self) -> InclusionPredicate {
        InclusionPredicate::new(self.field.clone(), self.op, self.threshold)
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check entries that parse but cannot be used
    pub fn validate(&self) -> Result<(), ConfigError> {
        for filter in &self.filters {
            filter
                .predicate()
                .validate()
                .map_err(|e| ConfigError::InvalidFilter {
                    index: filter.index.clone(),
                    error: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("idxmngr").join("config.toml")),
            Some(PathBuf::from("/etc/idxmngr/config.toml")),
            Some(PathBuf::from("./idxmngr.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(data_dir) = lookup("IDXMNGR_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }

        if let Some(host) = lookup("IDXMNGR_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("IDXMNGR_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        if let Some(timeout) = lookup("IDXMNGR_OPERATION_TIMEOUT_MS") {
            if let Ok(t) = timeout.parse() {
                self.service.operation_timeout_ms = t;
            }
        }

        if let Some(level) = lookup("IDXMNGR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("IDXMNGR_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Built-in schemas plus the configured ones
    pub fn key_encoder(&self) -> Result<KeyEncoder, EncodingError> {
        let mut encoder = KeyEncoder::with_defaults();
        for schema in &self.schemas {
            encoder.register_template(&schema.name, &schema.template)?;
        }
        Ok(encoder)
    }

    /// Settings for the service core
    pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
        self.validate()?;
        Ok(ServiceConfig {
            data_dir: PathBuf::from(&self.storage.data_dir),
            sync_mode: self.storage.sync_mode,
            flush_interval_ms: self.storage.flush_interval_ms,
            operation_timeout_ms: self.service.operation_timeout_ms,
            max_batch_size: self.api.max_batch_size,
            filters: self
                .filters
                .iter()
                .map(|f| IndexFilter {
                    index: f.index.clone(),
                    network: f.network.clone(),
                    predicate: f.predicate(),
                })
                .collect(),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid filter for index '{index}': {error}")]
    InvalidFilter { index: String, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# idxmngr Configuration
#
# Environment variables override these settings:
# - IDXMNGR_DATA_DIR
# - IDXMNGR_API_HOST
# - IDXMNGR_API_PORT
# - IDXMNGR_OPERATION_TIMEOUT_MS
# - IDXMNGR_LOG_LEVEL
# - IDXMNGR_LOG_FORMAT

[storage]
# Root directory; each network gets <data_dir>/<network>/ with its
# config.yaml catalog and .bf index files
data_dir = "./data"

# When index files are fsynced: every_write, batched or none
sync_mode = "batched"

# How often catalog counters are written back (ms)
flush_interval_ms = 5000

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8083

# Allowed CORS origins (empty allows any)
cors_origins = []

# Request timeout in seconds
request_timeout_secs = 60

# Largest accepted insert batch
max_batch_size = 10000

# Batches buffered per streaming insert connection
stream_buffer = 16

[service]
# Deadline for one search or insert batch (ms, 0 disables)
operation_timeout_ms = 30000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/idxmngr/idxmngr.log"

# Key schemas. Built-in: speeding and purpose.
[[schemas]]
name = "speeding"
template = "spd::{speeding:3}::{obuId}::{collectionDt}"

# Inclusion predicates per index, used when a batch brings none
# [[filters]]
# index = "speeding"
# network = "hardhat"
# field = "speeding"
# op = "GtEq"
# threshold = 60
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.api.port, 8083);
        assert_eq!(config.storage.sync_mode, SyncMode::Batched);
        assert_eq!(config.api.max_batch_size, 10_000);
        assert_eq!(config.service.operation_timeout_ms, 30_000);
        assert_eq!(config.schemas.len(), 1);
        assert!(config.filters.is_empty());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.storage.data_dir, "./data");
        assert_eq!(config.api.stream_buffer, 16);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_schemas_and_filters() {
        let toml = r#"
[storage]
sync_mode = "every_write"

[[schemas]]
name = "temperature"
template = "tmp::{celsius:3}::{sensor}"

[[filters]]
index = "speeding"
field = "speeding"
op = 5
threshold = 60
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.sync_mode, SyncMode::EveryWrite);

        let encoder = config.key_encoder().unwrap();
        assert!(encoder.get("temperature").is_some());
        assert!(encoder.get("speeding").is_some());

        let service = config.service_config().unwrap();
        assert_eq!(service.filters.len(), 1);
        assert_eq!(service.filters[0].predicate.op, ComparisonOp::GtEq);
        assert_eq!(service.filters[0].predicate.threshold, 60.0);
    }

    #[test]
    fn test_bad_schema_template() {
        let config: Config =
            toml::from_str("[[schemas]]\nname = \"x\"\ntemplate = \"{broken\"\n").unwrap();
        assert!(config.key_encoder().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars = HashMap::from([
            ("IDXMNGR_DATA_DIR", "/srv/idx"),
            ("IDXMNGR_API_PORT", "9000"),
            ("IDXMNGR_OPERATION_TIMEOUT_MS", "500"),
            ("IDXMNGR_LOG_FORMAT", "json"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.storage.data_dir, "/srv/idx");
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.service.operation_timeout_ms, 500);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.api.host, "0.0.0.0");
    }

    #[test]
    fn test_range_filter_rejected() {
        let toml = r#"
[[filters]]
index = "speeding"
field = "speeding"
op = "Range"
threshold = 60
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(
            config.service_config().unwrap_err(),
            ConfigError::InvalidFilter { ref index, .. } if index == "speeding"
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idxmngr.toml");
        std::fs::write(&path, toml).unwrap();
        assert!(matches!(
            Config::load(&path).unwrap_err(),
            ConfigError::InvalidFilter { .. }
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/idxmngr.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
