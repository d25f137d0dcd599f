//! TOML configuration.
//!
//! ```toml
//! [stream]
//! ring_buffer_bytes = 2097152
//! pump_interval_ms = 50
//! pump_chunk_bytes = 125000
//!
//! [backend]
//! libhdhomerun_path = "/usr/lib/libhdhomerun.so"
//! libvlc_path = "/usr/lib/libvlc.so.5"
//! vlc_args = ["--no-xlib"]
//!
//! [logging]
//! log_dir = "logs"
//! retention_days = 7
//! level = "info"
//!
//! [scan]
//! default_channel_map = "us-bcast"
//! ```
//!
//! Every key is optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hdhomerun_model::ChannelMap;
use log::info;
use serde::Deserialize;
use thiserror::Error;

use crate::logging::LoggingOptions;
use crate::session::SessionSettings;
use crate::stream::pump::{DEFAULT_PUMP_CHUNK, DEFAULT_PUMP_INTERVAL};
use crate::stream::{PumpConfig, DEFAULT_RING_BUFFER_SIZE};

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "hdhomerun-preview.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PreviewConfig {
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub scan: ScanSection,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamSection {
    pub ring_buffer_bytes: usize,
    pub pump_interval_ms: u64,
    pub pump_chunk_bytes: usize,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            ring_buffer_bytes: DEFAULT_RING_BUFFER_SIZE,
            pump_interval_ms: DEFAULT_PUMP_INTERVAL.as_millis() as u64,
            pump_chunk_bytes: DEFAULT_PUMP_CHUNK,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSection {
    /// Tuner library; searched on the default library path when unset.
    pub libhdhomerun_path: Option<PathBuf>,
    /// Media library; searched on the default library path when unset.
    pub libvlc_path: Option<PathBuf>,
    /// Extra arguments for the media library instance.
    pub vlc_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSection {
    pub log_dir: Option<PathBuf>,
    pub retention_days: u64,
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            log_dir: None,
            retention_days: 7,
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanSection {
    pub default_channel_map: ChannelMap,
}

impl PreviewConfig {
    /// Parse a config document.
    pub fn from_toml(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let config: PreviewConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &contents)
    }

    /// Load `explicit`, else [`DEFAULT_CONFIG_FILE`] if present, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            info!("[Config] Using {}", DEFAULT_CONFIG_FILE);
            return Self::load(default_path);
        }
        Ok(Self::default())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.ring_buffer_bytes < 2 {
            return Err(ConfigError::Invalid("stream.ring_buffer_bytes must be at least 2".into()));
        }
        if self.stream.pump_interval_ms == 0 {
            return Err(ConfigError::Invalid("stream.pump_interval_ms must be positive".into()));
        }
        if self.stream.pump_chunk_bytes == 0 {
            return Err(ConfigError::Invalid("stream.pump_chunk_bytes must be positive".into()));
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            ring_buffer_bytes: self.stream.ring_buffer_bytes,
            pump: PumpConfig {
                interval: Duration::from_millis(self.stream.pump_interval_ms),
                chunk_size: self.stream.pump_chunk_bytes,
            },
        }
    }

    pub fn logging_options(&self, verbose: bool) -> LoggingOptions {
        LoggingOptions {
            log_dir: self.logging.log_dir.clone(),
            retention_days: self.logging.retention_days,
            level: self.logging.level.clone(),
            verbose,
        }
    }
}
