/*!
 * Configuration types for Orbit portability uploads
 */

use crate::error::{Result, TransferError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default cutover between single-shot and multipart upload (20 MiB)
pub const DEFAULT_SIZE_THRESHOLD_BYTES: u64 = 20 * 1024 * 1024;

/// Default multipart part size (5 MiB)
pub const DEFAULT_PART_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Upload strategy parameters
///
/// Payloads up to `size_threshold_bytes` go up in a single write; larger ones
/// are split into `part_size_bytes` parts. Whether the threshold exceeds the
/// part size is not checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest payload uploaded in a single write
    #[serde(default = "default_size_threshold")]
    pub size_threshold_bytes: u64,

    /// Size of every multipart part except the last
    #[serde(default = "default_part_size")]
    pub part_size_bytes: u64,
}

impl UploadConfig {
    /// Create a validated upload configuration
    pub fn new(size_threshold_bytes: u64, part_size_bytes: u64) -> Result<Self> {
        let config = Self {
            size_threshold_bytes,
            part_size_bytes,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.part_size_bytes == 0 {
            return Err(TransferError::Configuration(
                "part_size_bytes must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            size_threshold_bytes: DEFAULT_SIZE_THRESHOLD_BYTES,
            part_size_bytes: DEFAULT_PART_SIZE_BYTES,
        }
    }
}

fn default_size_threshold() -> u64 {
    DEFAULT_SIZE_THRESHOLD_BYTES
}

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE_BYTES
}

/// S3 connection parameters shared by every job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3BackendConfig {
    /// AWS region (e.g., "us-east-1"); default provider chain if unset
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint URL (for S3-compatible services like MinIO)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Per-service endpoint overrides, keyed by routing hint
    #[serde(default)]
    pub service_endpoints: HashMap<String, String>,

    /// Path-style addressing (required for some S3-compatible services)
    #[serde(default)]
    pub force_path_style: bool,

    /// Operation timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl S3BackendConfig {
    /// Endpoint to use for a routing hint, falling back to the shared endpoint
    pub fn endpoint_for(&self, routing_hint: &str) -> Option<&str> {
        self.service_endpoints
            .get(routing_hint)
            .or(self.endpoint.as_ref())
            .map(String::as_str)
    }
}

impl Default for S3BackendConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            service_endpoints: HashMap::new(),
            force_path_style: false,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    300 // 5 minutes
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortabilityConfig {
    /// Upload strategy parameters
    #[serde(default)]
    pub upload: UploadConfig,

    /// S3 connection parameters
    #[serde(default)]
    pub s3: S3BackendConfig,

    /// Directory for temporary per-item payload files (None = system temp)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl PortabilityConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TransferError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: PortabilityConfig = toml::from_str(&contents).map_err(|e| {
            TransferError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.upload.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| TransferError::Configuration(format!("Failed to encode config: {}", e)))?;
        std::fs::write(path, contents).map_err(|e| {
            TransferError::Configuration(format!("Failed to write {}: {}", path.display(), e))
        })?;
        Ok(())
    }
}
