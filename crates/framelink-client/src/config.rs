//! CLI configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/framelink/config.toml` by default:
//!
//! ```toml
//! [server]
//! address = "0.0.0.0:8888"
//! idle_timeout_ms = 3000
//! upload_dir = "uploads"
//!
//! [client]
//! address = "localhost:8888"
//! timeout = 5
//! keepalive_ms = 1000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use framelink_protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use framelink_server::ServerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Configuration for the framelink CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Settings for `framelink serve`.
    pub server: ServerSettings,

    /// Settings for the client subcommands.
    pub client: ConnectionSettings,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to listen on.
    pub address: String,

    /// Idle read timeout in milliseconds.
    pub idle_timeout_ms: u64,

    /// Directory uploads are written to.
    pub upload_dir: PathBuf,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Largest Echo or File-header payload accepted.
    pub max_payload_size: u64,

    /// Slots in the async delivery queue.
    pub queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            address: defaults.address,
            idle_timeout_ms: defaults.idle_timeout.as_millis() as u64,
            upload_dir: defaults.upload_dir,
            max_connections: defaults.max_connections,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            queue_capacity: defaults.queue_capacity,
        }
    }
}

impl ServerSettings {
    /// Builds the server configuration these settings describe.
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig::new(&self.address)
            .with_idle_timeout(Duration::from_millis(self.idle_timeout_ms))
            .with_upload_dir(&self.upload_dir)
            .with_max_connections(self.max_connections)
            .with_max_payload_size(self.max_payload_size)
            .with_queue_capacity(self.queue_capacity)
    }
}

/// Connection settings for client subcommands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Server address to connect to.
    pub address: String,

    /// Connection timeout in seconds.
    pub timeout: u64,

    /// Ping interval in milliseconds while `listen` waits for messages.
    ///
    /// Keep it below the server's idle timeout.
    pub keepalive_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            address: "localhost:8888".to_string(),
            timeout: 5,
            keepalive_ms: 1000,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("framelink")
    }

    /// Checks every setting without touching the network.
    pub fn validate(&self) -> ClientResult<()> {
        self.server
            .to_server_config()
            .validate()
            .map_err(|e| ClientError::Config(format!("[server]: {}", e)))?;

        if self.client.address.is_empty() {
            return Err(ClientError::Config(
                "[client]: address must not be empty".into(),
            ));
        }
        if self.client.timeout == 0 {
            return Err(ClientError::Config(
                "[client]: timeout must be greater than zero".into(),
            ));
        }
        if self.client.keepalive_ms == 0 {
            return Err(ClientError::Config(
                "[client]: keepalive_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
