//! Frame types.

use std::fmt;

use crate::error::ProtocolError;

/// The 16-bit type tag at the start of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FrameType {
    /// Liveness probe sent by the client.
    Ping = 1,
    /// Request/response echo; the reply reuses this tag.
    Echo = 2,
    /// File upload header, followed by raw content.
    File = 3,
    /// Reply to [`FrameType::Ping`].
    Pong = 4,
    /// Server-pushed async message.
    Msg = 5,
}

impl FrameType {
    /// Returns the wire value of this tag.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns true if a frame of this type carries `length` payload bytes
    /// that a reader must consume.
    pub fn has_payload(self) -> bool {
        matches!(self, Self::Echo | Self::File | Self::Msg)
    }
}

impl TryFrom<u16> for FrameType {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Ping),
            2 => Ok(Self::Echo),
            3 => Ok(Self::File),
            4 => Ok(Self::Pong),
            5 => Ok(Self::Msg),
            other => Err(ProtocolError::UnknownFrameType(other)),
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ping => "ping",
            Self::Echo => "echo",
            Self::File => "file",
            Self::Pong => "pong",
            Self::Msg => "msg",
        };
        f.write_str(name)
    }
}

/// A decoded 10-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub length: u64,
}

impl FrameHeader {
    pub fn new(frame_type: FrameType, length: u64) -> Self {
        Self { frame_type, length }
    }
}

/// The inner layout of a File payload.
///
/// The name is kept as raw bytes; it is usually UTF-8 but nothing on the
/// wire guarantees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Number of raw content bytes that follow the frame.
    pub size: u64,
    /// File name as sent by the client.
    pub name: Vec<u8>,
}

impl FileHeader {
    pub fn new(size: u64, name: impl Into<Vec<u8>>) -> Self {
        Self {
            size,
            name: name.into(),
        }
    }

    /// The name decoded as UTF-8, with invalid sequences replaced.
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// A complete frame as seen by a reader.
///
/// For [`Frame::File`] only the header is represented; the content still
/// sits in the stream after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Ping,
    Pong,
    Echo(Vec<u8>),
    File(FileHeader),
    Msg(Vec<u8>),
}

impl Frame {
    /// Returns the type tag of this frame.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Ping => FrameType::Ping,
            Self::Pong => FrameType::Pong,
            Self::Echo(_) => FrameType::Echo,
            Self::File(_) => FrameType::File,
            Self::Msg(_) => FrameType::Msg,
        }
    }

    /// Encodes this frame into header + payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Ping => crate::encode_ping(),
            Self::Pong => crate::encode_pong(),
            Self::Echo(message) => crate::encode_echo(message),
            Self::File(header) => crate::encode_file_header(header.size, &header.name),
            Self::Msg(message) => crate::encode_msg(message),
        }
    }
}
