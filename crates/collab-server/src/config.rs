//! Configuration for the session server.
//!
//! Values are layered, later layers winning:
//!
//! 1. Built-in defaults.
//! 2. An optional TOML file (`--config <path>` or `COLLAB_CONFIG`).
//! 3. Environment variables:
//!    - `COLLAB_BIND_ADDR`             (default: "0.0.0.0")
//!    - `COLLAB_PORT`                  (default: "3301")
//!    - `COLLAB_MAX_CLIENTS`           (default: "1024")
//!    - `COLLAB_BROADCAST_INTERVAL_MS` (default: "50", 0 disables throttling)
//!    - `COLLAB_ROOM_IDLE_SECS`        (default: "600", 0 keeps empty rooms forever)
//!    - `COLLAB_MAX_FRAME_BYTES`       (default: "1000000")
//!    - `COLLAB_DEFAULT_DOCUMENT`
//! 4. Command-line flags (applied by the binary).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use collab_core::{EngineConfig, DEFAULT_DOCUMENT};
use collab_protocol::wire_types::DEFAULT_MAX_FRAME_BYTES;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming a TOML config file.
pub const CONFIG_PATH_ENV: &str = "COLLAB_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {key}: {message}")]
    Env {
        key: &'static str,
        value: String,
        message: String,
    },
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on. Both the line protocol and WebSocket share it.
    pub port: u16,

    /// Maximum number of simultaneously connected clients.
    pub max_clients: usize,

    /// Minimum spacing between document broadcasts per room, in milliseconds.
    pub broadcast_interval_ms: u64,

    /// How long an empty room is kept before eviction, in seconds.
    pub room_idle_secs: u64,

    /// Largest inbound frame accepted; bigger frames close the connection.
    pub max_frame_bytes: usize,

    /// Document every new (or emptied) room starts with.
    pub default_document: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 3301,
            max_clients: 1024,
            broadcast_interval_ms: 50,
            room_idle_secs: 600,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            default_document: DEFAULT_DOCUMENT.to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the optional file, then the process environment.
    ///
    /// `path` takes precedence over `COLLAB_CONFIG`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        match path.or(env_path.as_deref()) {
            Some(p) => {
                let mut config = Config::from_file(p)?;
                config.apply_env(|key| env::var(key).ok())?;
                Ok(config)
            }
            None => Config::from_env(),
        }
    }

    /// Construct a `Config` from environment variables, falling back
    /// to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse TOML; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Override fields from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("COLLAB_BIND_ADDR") {
            self.bind_addr = addr;
        }
        read_env_into(&lookup, "COLLAB_PORT", &mut self.port)?;
        read_env_into(&lookup, "COLLAB_MAX_CLIENTS", &mut self.max_clients)?;
        read_env_into(&lookup, "COLLAB_BROADCAST_INTERVAL_MS", &mut self.broadcast_interval_ms)?;
        read_env_into(&lookup, "COLLAB_ROOM_IDLE_SECS", &mut self.room_idle_secs)?;
        read_env_into(&lookup, "COLLAB_MAX_FRAME_BYTES", &mut self.max_frame_bytes)?;
        if let Some(doc) = lookup("COLLAB_DEFAULT_DOCUMENT") {
            self.default_document = doc;
        }
        Ok(())
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    /// Zero means idle rooms are never evicted.
    pub fn room_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.room_idle_secs)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            default_document: self.default_document.clone(),
            broadcast_interval: self.broadcast_interval(),
        }
    }
}

fn read_env_into<T, F>(lookup: &F, key: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(key) {
        *target = value.trim().parse::<T>().map_err(|e| ConfigError::Env {
            key,
            message: e.to_string(),
            value,
        })?;
    }
    Ok(())
}
