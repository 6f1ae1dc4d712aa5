//! Configuration module for openmonitor.
//!
//! Process settings come from environment variables with sensible defaults;
//! the monitored systems come from a JSON config document.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::db::{Config, StoreConfig};

/// Config document loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "openmonitor.db")
    pub db_path: String,
    /// Config document applied at start-up, if any
    pub config_path: Option<String>,
    /// Seconds between retention sweeps (default: 60)
    pub retention_secs: u64,
    /// SQLite busy timeout in milliseconds (default: 5000)
    pub busy_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "openmonitor.db".to_string(),
            config_path: None,
            retention_secs: 60,
            busy_timeout_ms: 5000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `OPENMONITOR_HTTP_PORT`: HTTP port (default: 8080)
    /// - `OPENMONITOR_DB_PATH`: Database file path (default: "openmonitor.db")
    /// - `OPENMONITOR_CONFIG`: Config document to apply at start-up
    /// - `OPENMONITOR_RETENTION_SECS`: Retention sweep period (default: 60)
    /// - `OPENMONITOR_BUSY_TIMEOUT_MS`: SQLite busy timeout (default: 5000)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(port) = lookup("OPENMONITOR_HTTP_PORT").and_then(|v| v.parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("OPENMONITOR_DB_PATH") {
            cfg.db_path = db_path;
        }

        cfg.config_path = lookup("OPENMONITOR_CONFIG").filter(|p| !p.is_empty());

        if let Some(secs) = lookup("OPENMONITOR_RETENTION_SECS").and_then(|v| v.parse().ok()) {
            if secs > 0 {
                cfg.retention_secs = secs;
            }
        }

        if let Some(ms) = lookup("OPENMONITOR_BUSY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            cfg.busy_timeout_ms = ms;
        }

        cfg
    }

    /// Store connection settings.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: PathBuf::from(&self.db_path),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }

    pub fn retention_period(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Parse a config document.
pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    Ok(serde_json::from_str(text)?)
}

/// Read and parse the config document at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&text)
}
