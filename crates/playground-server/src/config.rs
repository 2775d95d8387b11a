//! Configuration for the playground server.
//!
//! Sources, lowest to highest precedence:
//! 1. built-in defaults;
//! 2. an optional TOML file (`--config`);
//! 3. environment variables:
//!    - `PLAYGROUND_BIND_ADDR`         (default: "0.0.0.0")
//!    - `PLAYGROUND_PORT`              (default: "9000")
//!    - `PLAYGROUND_MAX_CLIENTS`       (default: "1024")
//!    - `PLAYGROUND_OUTBOUND_BUFFER`   (default: "256")
//!    - `PLAYGROUND_STORE_TIMEOUT_MS`  (default: "2000")
//!    - `PLAYGROUND_WRITE_TIMEOUT_MS`  (default: "5000")
//!    - `PLAYGROUND_MAX_DECODE_ERRORS` (default: "5")
//!    - `PLAYGROUND_WORLD_FILE`
//! 4. command-line flags, applied by the binary.

use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("{key}={value:?}: {reason}")]
    Env {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    pub port: u16,

    /// Maximum number of simultaneously connected clients.
    pub max_clients: usize,

    /// Frames queued per session before it is dropped as a slow consumer.
    pub outbound_buffer: usize,

    pub store_timeout_ms: u64,

    pub write_timeout_ms: u64,

    /// Consecutive malformed frames tolerated before the connection closes.
    pub max_decode_errors: u32,

    /// World seed loaded before accepting connections.
    pub world_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 9000,
            max_clients: 1024,
            outbound_buffer: 256,
            store_timeout_ms: 2000,
            write_timeout_ms: 5000,
            max_decode_errors: 5,
            world_file: None,
        }
    }
}

impl Config {
    /// Defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(p) => Config::from_file(p)?,
            None => Config::default(),
        };
        let config = base.with_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `PLAYGROUND_*` variables read through `lookup`.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PLAYGROUND_BIND_ADDR") {
            self.bind_addr = v;
        }
        override_from(&lookup, "PLAYGROUND_PORT", &mut self.port)?;
        override_from(&lookup, "PLAYGROUND_MAX_CLIENTS", &mut self.max_clients)?;
        override_from(&lookup, "PLAYGROUND_OUTBOUND_BUFFER", &mut self.outbound_buffer)?;
        override_from(&lookup, "PLAYGROUND_STORE_TIMEOUT_MS", &mut self.store_timeout_ms)?;
        override_from(&lookup, "PLAYGROUND_WRITE_TIMEOUT_MS", &mut self.write_timeout_ms)?;
        override_from(&lookup, "PLAYGROUND_MAX_DECODE_ERRORS", &mut self.max_decode_errors)?;
        if let Some(v) = lookup("PLAYGROUND_WORLD_FILE") {
            self.world_file = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clients == 0 {
            return Err(ConfigError::Invalid("max_clients must be at least 1".into()));
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::Invalid("outbound_buffer must be at least 1".into()));
        }
        if self.max_decode_errors == 0 {
            return Err(ConfigError::Invalid("max_decode_errors must be at least 1".into()));
        }
        if self.store_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        Ok(())
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

fn override_from<T, F>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(key) {
        *slot = value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
            key: key.to_string(),
            value: value.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
