use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::constants::{
    DEFAULT_ARTIFACTS_DIR, DEFAULT_BIND_ADDR, DEFAULT_DATABASE_FILE, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_RADIUS,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Server settings, loadable from JSON. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub radius: u32,
    pub database_path: PathBuf,
    /// Directory receiving raw request payloads. `None` disables the sink.
    pub artifacts_dir: Option<PathBuf>,
    /// Blur worker threads. `None` uses available parallelism.
    pub workers: Option<usize>,
    pub max_frame_bytes: Option<u64>,
    pub max_connections: Option<usize>,
    pub read_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            radius: DEFAULT_RADIUS,
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            artifacts_dir: Some(PathBuf::from(DEFAULT_ARTIFACTS_DIR)),
            workers: None,
            max_frame_bytes: Some(DEFAULT_MAX_FRAME_BYTES),
            max_connections: None,
            read_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    /// Platform config location, e.g. `~/.config/netblur/server.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("netblur").join("server.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path` if given, else the platform default if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.radius == 0 {
            return Err(ConfigError::Invalid(
                "radius must be a positive integer, got 0".into(),
            ));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.max_frame_bytes == Some(0) {
            return Err(ConfigError::Invalid(
                "max_frame_bytes must be at least 1".into(),
            ));
        }
        if self.max_connections == Some(0) {
            return Err(ConfigError::Invalid(
                "max_connections must be at least 1".into(),
            ));
        }
        if self.read_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "read_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }
}
