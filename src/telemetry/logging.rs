//! Subscriber setup driven by [`CacheConfig`].
//!
//! The filter comes from `log_level`, the layer from `log_format`, and the
//! sink from `log_file` (stderr when unset).

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::CacheConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human-readable events.
    Pretty,
}

impl LogFormat {
    /// Parse a format name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("cannot open log file: {0}")]
    FileOpen(String),
    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// Install the global subscriber described by `config`.
///
/// Fails with [`LogError::AlreadyInitialized`] if a subscriber exists.
pub fn init_logging(config: &CacheConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match (config.log_format, config.log_file.as_deref()) {
        (LogFormat::Json, None) => registry.with(fmt::layer().json()).try_init(),
        (LogFormat::Json, Some(path)) => {
            let writer = open_log_file(path)?;
            registry
                .with(fmt::layer().json().with_writer(writer))
                .try_init()
        }
        (LogFormat::Pretty, None) => registry.with(fmt::layer().pretty()).try_init(),
        (LogFormat::Pretty, Some(path)) => {
            let writer = open_log_file(path)?;
            registry
                .with(fmt::layer().pretty().with_ansi(false).with_writer(writer))
                .try_init()
        }
    };
    installed.map_err(|_| LogError::AlreadyInitialized)
}

fn open_log_file(path: &Path) -> Result<Mutex<File>, LogError> {
    File::create(path)
        .map(Mutex::new)
        .map_err(|e| LogError::FileOpen(format!("{}: {e}", path.display())))
}
