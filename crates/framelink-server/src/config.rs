//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use framelink_protocol::DEFAULT_MAX_PAYLOAD_SIZE;

use crate::error::{ServerError, ServerResult};

/// Default listen address.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8888";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (`host:port`).
    pub address: String,

    /// Maximum time a connection may stay silent between reads.
    pub idle_timeout: Duration,

    /// Directory uploaded files are written to.
    pub upload_dir: PathBuf,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Largest Echo or File-header payload read into memory.
    pub max_payload_size: u64,

    /// Slots in the async delivery queue.
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            idle_timeout: Duration::from_secs(3),
            upload_dir: PathBuf::from("uploads"),
            max_connections: 100,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            queue_capacity: 1,
        }
    }
}

impl ServerConfig {
    /// Creates a new server configuration listening on the given address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Builder: set the idle-read timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Builder: set the upload directory.
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    /// Builder: set max connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Builder: set the in-memory payload limit.
    pub fn with_max_payload_size(mut self, max: u64) -> Self {
        self.max_payload_size = max;
        self
    }

    /// Builder: set the delivery queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> ServerResult<()> {
        if self.address.is_empty() {
            return Err(ServerError::config("address must not be empty"));
        }
        if self.idle_timeout.is_zero() {
            return Err(ServerError::config("idle timeout must be greater than zero"));
        }
        if self.max_connections == 0 {
            return Err(ServerError::config("max connections must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(ServerError::config("queue capacity must be at least 1"));
        }
        Ok(())
    }
}
