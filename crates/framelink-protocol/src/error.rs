//! Protocol error types.

use thiserror::Error;

use crate::frame::FrameType;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding or reading frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The type tag is not one of the known frame types.
    #[error("unknown frame type: 0x{0:04X}")]
    UnknownFrameType(u16),

    /// A known frame type arrived on the side that never receives it.
    #[error("unexpected {0} frame")]
    UnexpectedFrame(FrameType),

    /// A File frame whose length cannot hold the file-size field.
    #[error("file header too short: length {length} (need at least 8)")]
    FileHeaderTooShort { length: u64 },

    /// A payload larger than the configured limit.
    #[error("payload too large: {length} bytes (max: {max})")]
    PayloadTooLarge { length: u64, max: u64 },

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns true for errors caused by the peer violating the protocol,
    /// as opposed to the transport failing underneath it.
    pub fn is_violation(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}
