//! Configuration loading and validation for sp-core.
//!
//! This module handles:
//! - The `ServerConfig` file format (JSON, every field optional)
//! - Config resolution order (CLI > env > XDG > defaults)
//! - Semantic validation
//! - Provenance reporting for the `check` command

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::source::DEFAULT_MAX_LINE_BYTES;

/// Env var naming an explicit config file.
pub const ENV_CONFIG: &str = "SOCIAL_PULSE_CONFIG";

/// Directory under the XDG config home.
const CONFIG_DIR_NAME: &str = "social_pulse";

/// File name inside the config directory.
const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_ADDR: &str = "localhost:8080";
pub const DEFAULT_STREAM_URL: &str = "https://stream.upfluence.co/stream";
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;
pub const DEFAULT_DURATION_SECS: u64 = 5;

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl From<ConfigError> for sp_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => sp_common::Error::ConfigNotFound {
                path: path.display().to_string(),
            },
            other => sp_common::Error::Config(other.to_string()),
        }
    }
}

/// Server and stream settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address of the HTTP server.
    pub addr: String,
    /// Event feed URL.
    pub stream_url: String,
    /// Buffer size of subscriber channels and topic intakes.
    pub buffer_capacity: usize,
    /// Window used by `analyze` when no duration is given.
    pub default_duration_secs: u64,
    /// Longest feed line accepted before the stream is failed.
    pub max_line_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: DEFAULT_ADDR.to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            default_duration_secs: DEFAULT_DURATION_SECS,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl ServerConfig {
    /// Check semantic constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "buffer_capacity",
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_line_bytes",
                message: "must be at least 1".to_string(),
            });
        }
        if self.addr.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "addr",
                message: "must not be empty".to_string(),
            });
        }
        if !(self.stream_url.starts_with("http://") || self.stream_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "stream_url",
                message: format!("expected an http(s) URL, got {:?}", self.stream_url),
            });
        }
        Ok(())
    }

    pub fn default_duration(&self) -> Duration {
        Duration::from_secs(self.default_duration_secs)
    }
}

/// Where the resolved configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ConfigSource {
    /// `--config` flag.
    Explicit(PathBuf),
    /// `SOCIAL_PULSE_CONFIG`.
    Env(PathBuf),
    /// `$XDG_CONFIG_HOME/social_pulse/config.json`.
    Xdg(PathBuf),
    /// No file; built-in defaults.
    Defaults,
}

/// Resolved configuration with provenance information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub config: ServerConfig,
    pub source: ConfigSource,
}

/// Configuration resolution inputs.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    /// Explicit config file (highest priority).
    pub config_path: Option<PathBuf>,
    /// Path from the environment.
    pub env_path: Option<PathBuf>,
    /// XDG config home.
    pub config_home: Option<PathBuf>,
}

impl ConfigOptions {
    /// Options for the current process: `explicit` from the CLI, plus the
    /// environment and the platform config directory.
    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        ConfigOptions {
            config_path: explicit,
            env_path: std::env::var_os(ENV_CONFIG)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            config_home: dirs::config_dir(),
        }
    }
}

/// Load configuration with the standard resolution order.
///
/// Resolution order (highest to lowest priority):
/// 1. Explicit `--config` path (must exist)
/// 2. `SOCIAL_PULSE_CONFIG` (must exist)
/// 3. `$XDG_CONFIG_HOME/social_pulse/config.json` (used when present)
/// 4. Built-in defaults
///
/// The result is validated before it is returned.
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    let (config, source) = if let Some(path) = &options.config_path {
        (load_file(path)?, ConfigSource::Explicit(path.clone()))
    } else if let Some(path) = &options.env_path {
        (load_file(path)?, ConfigSource::Env(path.clone()))
    } else {
        match options
            .config_home
            .as_ref()
            .map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .filter(|path| path.is_file())
        {
            Some(path) => (load_file(&path)?, ConfigSource::Xdg(path)),
            None => (ServerConfig::default(), ConfigSource::Defaults),
        }
    };

    config.validate()?;
    Ok(ResolvedConfig { config, source })
}

/// Read and parse one config file.
pub fn load_file(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::IoError {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}
