//! TCP client for talking to a framelink server.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use framelink_protocol::{FileHeader, Frame, FrameReader, FrameType, FrameWriter, ProtocolError};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// A frame the server may send to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Reply to a Ping.
    Pong,
    /// Reply to an Echo, carrying the original message.
    Echo(Vec<u8>),
    /// Message pushed by the server outside of any request.
    Msg(Vec<u8>),
}

impl Response {
    /// Returns the wire type of this response.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Pong => FrameType::Pong,
            Self::Echo(_) => FrameType::Echo,
            Self::Msg(_) => FrameType::Msg,
        }
    }

    /// Returns the payload; empty for Pong.
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Pong => &[],
            Self::Echo(payload) | Self::Msg(payload) => payload,
        }
    }

    /// Returns a serializable view for `--json` output.
    pub fn record(&self) -> ResponseRecord<'_> {
        ResponseRecord {
            frame_type: self.frame_type().to_string(),
            length: self.payload().len(),
            payload: String::from_utf8_lossy(self.payload()),
        }
    }
}

impl TryFrom<Frame> for Response {
    type Error = ProtocolError;

    /// Fails for frame types only a client sends.
    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        match frame {
            Frame::Pong => Ok(Self::Pong),
            Frame::Echo(payload) => Ok(Self::Echo(payload)),
            Frame::Msg(payload) => Ok(Self::Msg(payload)),
            other => Err(ProtocolError::UnexpectedFrame(other.frame_type())),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pong => write!(f, "pong"),
            Self::Echo(payload) => write!(f, "echo: {}", String::from_utf8_lossy(payload)),
            Self::Msg(payload) => write!(f, "msg: {}", String::from_utf8_lossy(payload)),
        }
    }
}

/// JSON shape of a [`Response`].
#[derive(Debug, Serialize)]
pub struct ResponseRecord<'a> {
    /// Lowercase frame type name.
    #[serde(rename = "type")]
    pub frame_type: String,
    /// Payload length in bytes.
    pub length: usize,
    /// Payload decoded as UTF-8, lossily.
    pub payload: Cow<'a, str>,
}

/// Client connection to a framelink server.
///
/// Pushed Msg frames that arrive while [`FrameClient::ping`] or
/// [`FrameClient::echo`] wait for their reply are kept and handed out by
/// [`FrameClient::read_response`] later, in arrival order.
pub struct FrameClient {
    peer: SocketAddr,
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    pending: VecDeque<Vec<u8>>,
}

impl FrameClient {
    /// Connects to `addr`, giving up after `timeout`.
    pub async fn connect(addr: &str, timeout: Duration) -> ClientResult<Self> {
        debug!(addr = %addr, "connecting to server");

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ClientError::Timeout(format!("connecting to {} after {:?}", addr, timeout))
            })?
            .map_err(|e| ClientError::Connection(format!("failed to connect to {}: {}", addr, e)))?;

        Self::from_stream(stream)
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream) -> ClientResult<Self> {
        let peer = stream.peer_addr()?;
        let (read, write) = stream.into_split();
        Ok(Self {
            peer,
            reader: FrameReader::new(read),
            writer: FrameWriter::new(write),
            pending: VecDeque::new(),
        })
    }

    /// Returns the server address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sends a Ping without waiting for the reply.
    pub async fn send_ping(&mut self) -> ClientResult<()> {
        self.send(&Frame::Ping).await
    }

    /// Sends an Echo request without waiting for the reply.
    pub async fn send_echo(&mut self, message: &[u8]) -> ClientResult<()> {
        self.send(&Frame::Echo(message.to_vec())).await
    }

    /// Sends a Ping and waits for the Pong.
    pub async fn ping(&mut self) -> ClientResult<()> {
        self.send_ping().await?;
        match self.await_reply().await? {
            Response::Pong => Ok(()),
            other => Err(ProtocolError::UnexpectedFrame(other.frame_type()).into()),
        }
    }

    /// Sends an Echo request and returns the echoed message.
    pub async fn echo(&mut self, message: &[u8]) -> ClientResult<Vec<u8>> {
        self.send_echo(message).await?;
        match self.await_reply().await? {
            Response::Echo(payload) => Ok(payload),
            other => Err(ProtocolError::UnexpectedFrame(other.frame_type()).into()),
        }
    }

    /// Uploads a file from disk under its own file name.
    ///
    /// The server never acknowledges uploads; success means the bytes were
    /// written to the socket.
    pub async fn upload_file(&mut self, path: &Path) -> ClientResult<u64> {
        let name = path.file_name().ok_or_else(|| {
            ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            ))
        })?;
        let name = name.to_string_lossy().into_owned();

        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        self.upload_reader(name.as_bytes(), size, file).await
    }

    /// Uploads exactly `size` bytes read from `reader` as `name`.
    pub async fn upload_reader<R>(&mut self, name: &[u8], size: u64, reader: R) -> ClientResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        debug!(name = %String::from_utf8_lossy(name), size, "uploading file");
        self.writer
            .write_frame(&Frame::File(FileHeader::new(size, name)))
            .await?;
        let sent = self.writer.write_content(reader, size).await?;
        self.writer.flush().await?;
        Ok(sent)
    }

    /// Reads the next response, including messages held back by
    /// [`FrameClient::ping`] and [`FrameClient::echo`].
    ///
    /// Returns `Ok(None)` once the server has closed the connection.
    pub async fn read_response(&mut self) -> ClientResult<Option<Response>> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(Some(Response::Msg(message)));
        }
        self.next_response().await
    }

    /// Waits for the next pushed message, skipping any other response.
    pub async fn next_message(&mut self) -> ClientResult<Option<Vec<u8>>> {
        loop {
            match self.read_response().await? {
                Some(Response::Msg(message)) => return Ok(Some(message)),
                Some(other) => debug!(response = %other, "skipping unsolicited response"),
                None => return Ok(None),
            }
        }
    }

    /// Splits the client into its frame reader and writer.
    ///
    /// Messages held back by [`FrameClient::ping`] or [`FrameClient::echo`]
    /// and not yet read are returned alongside.
    pub fn into_parts(
        self,
    ) -> (
        FrameReader<OwnedReadHalf>,
        FrameWriter<OwnedWriteHalf>,
        Vec<Vec<u8>>,
    ) {
        (self.reader, self.writer, self.pending.into())
    }

    /// Closes the write side of the connection.
    pub async fn shutdown(&mut self) -> ClientResult<()> {
        self.writer.get_mut().shutdown().await?;
        Ok(())
    }

    async fn send(&mut self, frame: &Frame) -> ClientResult<()> {
        self.writer.write_frame(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn next_response(&mut self) -> ClientResult<Option<Response>> {
        match self.reader.read_frame().await? {
            Some(frame) => Ok(Some(Response::try_from(frame)?)),
            None => Ok(None),
        }
    }

    async fn await_reply(&mut self) -> ClientResult<Response> {
        loop {
            match self.next_response().await? {
                Some(Response::Msg(message)) => self.pending.push_back(message),
                Some(reply) => return Ok(reply),
                None => {
                    return Err(ClientError::Connection(
                        "server closed the connection".into(),
                    ));
                }
            }
        }
    }
}
