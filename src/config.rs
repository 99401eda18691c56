//! Configuration loading from environment variables or TOML.
//!
//! Environment values are read from `MIRRORSYNC_*` variables with sensible
//! defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `MIRRORSYNC_DEVICE_CAPACITY` | 268435456 | Host-backed device capacity (bytes) |
//! | `MIRRORSYNC_DROP_POLICY` | discard | `discard` or `synchronize_last` |
//! | `MIRRORSYNC_LOG_LEVEL` | info | Log filter directive |
//! | `MIRRORSYNC_LOG_FORMAT` | json | `json` or `pretty` |
//! | `MIRRORSYNC_LOG_FILE` | (stderr) | Log output file |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DropPolicy;
use crate::telemetry::LogFormat;

const DEFAULT_DEVICE_CAPACITY: usize = 256 * 1024 * 1024;
const MIN_DEVICE_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(String),
    #[error("Failed to read config file: {0}")]
    Io(String),
}

/// Cache and device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Capacity of the host-backed device allocator in bytes.
    pub device_capacity: usize,
    pub drop_policy: DropPolicy,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Log file; `None` logs to stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            device_capacity: DEFAULT_DEVICE_CAPACITY,
            drop_policy: DropPolicy::Discard,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            log_file: None,
        }
    }
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub device_capacity: usize,
    pub drop_policy: String,
    pub log_level: String,
    pub log_format: String,
    pub log_file: Option<String>,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_drop_policy(key: &str) -> DropPolicy {
    match std::env::var(key).as_deref().map(str::trim) {
        Ok("synchronize_last") => DropPolicy::SynchronizeLast,
        _ => DropPolicy::Discard,
    }
}

fn parse_log_format(key: &str) -> LogFormat {
    std::env::var(key)
        .ok()
        .and_then(|v| LogFormat::parse(&v))
        .unwrap_or_default()
}

/// Load configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> CacheConfig {
    let device_capacity = parse_usize("MIRRORSYNC_DEVICE_CAPACITY", DEFAULT_DEVICE_CAPACITY);
    let log_level = std::env::var("MIRRORSYNC_LOG_LEVEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let log_file = std::env::var_os("MIRRORSYNC_LOG_FILE")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    CacheConfig {
        device_capacity,
        drop_policy: parse_drop_policy("MIRRORSYNC_DROP_POLICY"),
        log_level,
        log_format: parse_log_format("MIRRORSYNC_LOG_FORMAT"),
        log_file,
    }
    .normalized()
}

impl CacheConfig {
    /// Parse a TOML document. Absent keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config.normalized())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&source)
    }

    fn normalized(mut self) -> Self {
        self.device_capacity = self.device_capacity.max(MIN_DEVICE_CAPACITY); // floor: 4 KiB
        self
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            device_capacity: self.device_capacity,
            drop_policy: match self.drop_policy {
                DropPolicy::Discard => "discard".to_string(),
                DropPolicy::SynchronizeLast => "synchronize_last".to_string(),
            },
            log_level: self.log_level.clone(),
            log_format: self.log_format.as_str().to_string(),
            log_file: self.log_file.as_ref().map(|p| p.display().to_string()),
        }
    }
}
