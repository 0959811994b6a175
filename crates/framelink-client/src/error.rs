//! Client error types.

use framelink_protocol::ProtocolError;
use framelink_server::ServerError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error or a frame the client does not accept.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection to server failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Operation timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The embedded server failed.
    #[error("server error: {0}")]
    Server(#[from] ServerError),
}

impl ClientError {
    /// Returns true if the server closed the connection.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Io(e) | Self::Protocol(ProtocolError::Io(e)) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
