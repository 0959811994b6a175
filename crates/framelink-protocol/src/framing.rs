//! Frame encoding and decoding.
//!
//! The `encode_*` and `decode_*` functions are pure and never touch I/O.
//! [`FrameReader`] and [`FrameWriter`] wrap async streams and apply the
//! per-type payload rules on top of them.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{FileHeader, Frame, FrameHeader, FrameType};
use crate::{DEFAULT_MAX_PAYLOAD_SIZE, FILE_SIZE_FIELD, HEADER_SIZE};

/// Encodes a frame with the given type and payload.
///
/// The header length field is set to the payload length.
///
/// # Example
///
/// ```rust
/// use framelink_protocol::{encode_frame, FrameType};
///
/// let bytes = encode_frame(FrameType::Msg, b"hi");
/// assert_eq!(bytes, [0, 5, 0, 0, 0, 0, 0, 0, 0, 2, b'h', b'i']);
/// ```
pub fn encode_frame(frame_type: FrameType, payload: &[u8]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(HEADER_SIZE + payload.len());
    buffer.extend_from_slice(&frame_type.as_u16().to_be_bytes());
    buffer.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    buffer.extend_from_slice(payload);
    buffer
}

/// Encodes a Ping frame (header only).
pub fn encode_ping() -> Vec<u8> {
    encode_frame(FrameType::Ping, &[])
}

/// Encodes a Pong frame (header only).
pub fn encode_pong() -> Vec<u8> {
    encode_frame(FrameType::Pong, &[])
}

/// Encodes an Echo frame. Requests and replies share this encoding.
pub fn encode_echo(message: &[u8]) -> Vec<u8> {
    encode_frame(FrameType::Echo, message)
}

/// Encodes an async Msg frame.
pub fn encode_msg(message: &[u8]) -> Vec<u8> {
    encode_frame(FrameType::Msg, message)
}

/// Encodes the header and payload of a File frame.
///
/// The payload is the 8-byte big-endian `file_size` followed by `name`.
/// The caller must write exactly `file_size` content bytes after it.
pub fn encode_file_header(file_size: u64, name: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(FILE_SIZE_FIELD + name.len());
    payload.extend_from_slice(&file_size.to_be_bytes());
    payload.extend_from_slice(name);
    encode_frame(FrameType::File, &payload)
}

/// Decodes the fixed 10-byte header.
///
/// # Errors
///
/// Returns [`ProtocolError::UnknownFrameType`] if the tag is not known.
pub fn decode_header(bytes: &[u8; HEADER_SIZE]) -> ProtocolResult<FrameHeader> {
    let tag = u16::from_be_bytes([bytes[0], bytes[1]]);
    let frame_type = FrameType::try_from(tag)?;

    let mut length = [0u8; 8];
    length.copy_from_slice(&bytes[2..HEADER_SIZE]);

    Ok(FrameHeader::new(frame_type, u64::from_be_bytes(length)))
}

/// Decodes a File payload into its size and name.
///
/// # Errors
///
/// Returns [`ProtocolError::FileHeaderTooShort`] if the payload cannot hold
/// the file-size field.
pub fn decode_file_header(payload: &[u8]) -> ProtocolResult<FileHeader> {
    if payload.len() < FILE_SIZE_FIELD {
        return Err(ProtocolError::FileHeaderTooShort {
            length: payload.len() as u64,
        });
    }

    let mut size = [0u8; FILE_SIZE_FIELD];
    size.copy_from_slice(&payload[..FILE_SIZE_FIELD]);

    Ok(FileHeader::new(
        u64::from_be_bytes(size),
        &payload[FILE_SIZE_FIELD..],
    ))
}

/// Reads frames from an async byte stream.
///
/// The reader is not buffered, so after a File header has been read the
/// raw content can be pulled straight from [`FrameReader::get_mut`].
pub struct FrameReader<R> {
    reader: R,
    max_payload_size: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Creates a new FrameReader wrapping the given reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Sets the largest payload that will be read into memory.
    pub fn with_max_payload_size(mut self, max: u64) -> Self {
        self.max_payload_size = max;
        self
    }

    /// Reads and decodes the next header.
    ///
    /// Returns `Ok(None)` if the stream ended cleanly between frames. A
    /// stream that ends partway through a header is an
    /// [`std::io::ErrorKind::UnexpectedEof`] error.
    pub async fn read_header(&mut self) -> ProtocolResult<Option<FrameHeader>> {
        let mut buf = [0u8; HEADER_SIZE];
        let mut filled = 0;
        while filled < HEADER_SIZE {
            let read = self.reader.read(&mut buf[filled..]).await?;
            if read == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {} of {} header bytes", filled, HEADER_SIZE),
                )
                .into());
            }
            filled += read;
        }
        decode_header(&buf).map(Some)
    }

    /// Reads exactly `length` payload bytes.
    pub async fn read_payload(&mut self, length: u64) -> ProtocolResult<Vec<u8>> {
        if length > self.max_payload_size {
            return Err(ProtocolError::PayloadTooLarge {
                length,
                max: self.max_payload_size,
            });
        }
        let len = usize::try_from(length).map_err(|_| ProtocolError::PayloadTooLarge {
            length,
            max: self.max_payload_size,
        })?;

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await?;
        Ok(payload)
    }

    /// Reads the payload of a File frame whose header declared `length`.
    pub async fn read_file_header(&mut self, length: u64) -> ProtocolResult<FileHeader> {
        if length < FILE_SIZE_FIELD as u64 {
            return Err(ProtocolError::FileHeaderTooShort { length });
        }
        let payload = self.read_payload(length).await?;
        decode_file_header(&payload)
    }

    /// Reads the payload that belongs to `header`.
    ///
    /// Ping and Pong frames carry nothing; their length field is ignored.
    pub async fn read_body(&mut self, header: FrameHeader) -> ProtocolResult<Frame> {
        let frame = match header.frame_type {
            FrameType::Ping => Frame::Ping,
            FrameType::Pong => Frame::Pong,
            FrameType::Echo => Frame::Echo(self.read_payload(header.length).await?),
            FrameType::Msg => Frame::Msg(self.read_payload(header.length).await?),
            FrameType::File => Frame::File(self.read_file_header(header.length).await?),
        };
        Ok(frame)
    }

    /// Reads one complete frame.
    ///
    /// Returns `Ok(None)` at end of stream.
    pub async fn read_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        match self.read_header().await? {
            Some(header) => self.read_body(header).await.map(Some),
            None => Ok(None),
        }
    }

    /// Returns a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Returns a mutable reference to the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Unwraps this FrameReader, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes frames to an async byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Creates a new FrameWriter wrapping the given writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a single frame.
    pub async fn write_frame(&mut self, frame: &Frame) -> ProtocolResult<()> {
        self.writer.write_all(&frame.encode()).await?;
        Ok(())
    }

    /// Streams exactly `size` bytes from `source`, unframed.
    ///
    /// Used for File content after the File header has been written.
    pub async fn write_content<S>(&mut self, source: S, size: u64) -> ProtocolResult<u64>
    where
        S: AsyncRead + Unpin,
    {
        let mut limited = source.take(size);
        let copied = tokio::io::copy(&mut limited, &mut self.writer).await?;
        if copied != size {
            return Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("content ended after {copied} of {size} bytes"),
            )));
        }
        Ok(copied)
    }

    /// Flushes the underlying writer.
    pub async fn flush(&mut self) -> ProtocolResult<()> {
        self.writer.flush().await?;
        Ok(())
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Returns a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Unwraps this FrameWriter, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
