//! TOML-based configuration for the client binary.
//!
//! Default location:
//! - Windows:  `%APPDATA%\rpclink\client.toml`
//! - Linux:    `~/.config/rpclink/client.toml`
//! - macOS:    `~/Library/Application Support/rpclink/client.toml`
//!
//! Example file:
//!
//! ```toml
//! [client]
//! service_name = "db"
//! address_prefix = "rpc"
//! log_level = "info"
//!
//! [network]
//! discovery_port = 24802
//! retry_delay_ms = 3000
//! broadcast_address = "255.255.255.255"
//! ```
//!
//! Every field has a serde default, so a partial file (or no file at all)
//! still loads.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `broadcast_address` is not an IP address.
    #[error("invalid broadcast address `{0}`")]
    InvalidAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub network: NetworkSection,
}

/// What to look for and how to log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    /// Service name servers must answer to.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Passed to the transport to namespace each link.
    #[serde(default = "default_address_prefix")]
    pub address_prefix: String,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Discovery and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// UDP port discovery requests are sent to.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Re-broadcast interval and reconnect backoff, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Destination address of discovery broadcasts.
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_service_name() -> String {
    "rpclink".to_string()
}
fn default_address_prefix() -> String {
    "rpclink".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_discovery_port() -> u16 {
    24802
}
fn default_retry_delay_ms() -> u64 {
    3000
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            address_prefix: default_address_prefix(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            retry_delay_ms: default_retry_delay_ms(),
            broadcast_address: default_broadcast_address(),
        }
    }
}

impl NetworkSection {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Parses `broadcast_address`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if it is not an IP address.
    pub fn broadcast_ip(&self) -> Result<IpAddr, ConfigError> {
        self.broadcast_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.broadcast_address.clone()))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Returns the platform default config file path, if the platform config
/// directory can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    platform_config_dir().map(|dir| dir.join("client.toml"))
}

/// Loads `ClientConfig` from `path`, returning `ClientConfig::default()` if
/// the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("rpclink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("rpclink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("rpclink"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
