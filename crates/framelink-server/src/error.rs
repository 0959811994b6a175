//! Server error types.

use std::io;
use std::time::Duration;

use framelink_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket read or write failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Framing error or protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No frame arrived within the idle timeout.
    #[error("Idle timeout: no data for {timeout:?}")]
    IdleTimeout { timeout: Duration },

    /// Creating or writing an uploaded file failed.
    #[error("Upload of {name:?} failed: {source}")]
    Upload {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The listener could not bind.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The delivery queue has no consumer left.
    #[error("Delivery queue closed")]
    QueueClosed,

    /// The delivery queue is full.
    #[error("Delivery queue full")]
    QueueFull,

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Coarse classification of a [`ServerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket failure, short read or write, deadline exceeded.
    Transport,
    /// The peer sent something the protocol does not allow.
    Protocol,
    /// The upload destination failed.
    Filesystem,
    /// Setup and queue errors outside any one connection.
    Server,
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an upload error.
    pub fn upload(name: impl Into<String>, source: io::Error) -> Self {
        Self::Upload {
            name: name.into(),
            source,
        }
    }

    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::IdleTimeout { .. } => ErrorKind::Transport,
            Self::Protocol(e) if e.is_violation() => ErrorKind::Protocol,
            Self::Protocol(_) => ErrorKind::Transport,
            Self::Upload { .. } => ErrorKind::Filesystem,
            Self::Bind { .. } | Self::QueueClosed | Self::QueueFull | Self::Config { .. } => {
                ErrorKind::Server
            }
        }
    }
}
