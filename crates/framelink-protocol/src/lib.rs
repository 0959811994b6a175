//! Frame codec shared by the framelink client and server.
//!
//! # Wire format
//!
//! Every frame starts with a fixed 10-byte header:
//!
//! ```text
//! +-----------------+------------------------+------------------+
//! | type (2, BE)    | length (8, BE)         | payload          |
//! +-----------------+------------------------+------------------+
//! ```
//!
//! How `length` and the payload are interpreted depends on the type:
//!
//! | Type | length            | payload                                 |
//! |------|-------------------|-----------------------------------------|
//! | Ping | ignored           | none                                    |
//! | Pong | ignored           | none                                    |
//! | Echo | message length    | message bytes                           |
//! | File | 8 + name length   | file size (8, BE), then the file name   |
//! | Msg  | message length    | message bytes                           |
//!
//! A File frame is followed by exactly `file size` raw bytes of content,
//! outside of any framing.
//!
//! # Example
//!
//! ```rust
//! use framelink_protocol::{decode_header, encode_echo, FrameType, HEADER_SIZE};
//!
//! let bytes = encode_echo(b"Hello");
//! let header: [u8; HEADER_SIZE] = bytes[..HEADER_SIZE].try_into().unwrap();
//! let header = decode_header(&header).unwrap();
//! assert_eq!(header.frame_type, FrameType::Echo);
//! assert_eq!(header.length, 5);
//! ```

mod error;
mod frame;
mod framing;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{FileHeader, Frame, FrameHeader, FrameType};
pub use framing::{
    FrameReader, FrameWriter, decode_file_header, decode_header, encode_echo, encode_file_header,
    encode_frame, encode_msg, encode_ping, encode_pong,
};

/// Size of the fixed frame header.
pub const HEADER_SIZE: usize = 10;

/// Size of the file-size field at the start of a File payload.
pub const FILE_SIZE_FIELD: usize = 8;

/// Default upper bound for payloads that are read into memory (64 MiB).
///
/// File content is streamed and is not subject to this limit.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u64 = 64 * 1024 * 1024;
