//! Per-connection session handling.
//!
//! Each accepted connection gets two tasks sharing one [`SessionWriter`]:
//!
//! - the reader, running on the connection's own task, which reads one
//!   frame at a time under the idle deadline and answers it;
//! - the delivery task, which pushes messages from the shared
//!   [`DeliveryQueue`] as Msg frames.
//!
//! The first fatal error on either side closes the connection and stops
//! both tasks. Errors never leave the connection's task.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use framelink_protocol::{
    FileHeader, FrameHeader, FrameReader, FrameType, ProtocolError, ProtocolResult, encode_echo,
    encode_pong,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::ServerConfig;
use crate::delivery::{DeliveryQueue, run_delivery};
use crate::error::{ErrorKind, ServerError, ServerResult};
use crate::signals::ShutdownHandle;
use crate::socket::Connection;
use crate::upload::{UploadSink, UploadStore};
use crate::writer::SessionWriter;

/// Largest chunk copied from the socket to an upload at a time.
const UPLOAD_CHUNK_SIZE: u64 = 64 * 1024;

/// Runs framelink sessions.
///
/// One handler is shared by every connection of a server.
pub struct SessionHandler {
    idle_timeout: Duration,
    max_payload_size: u64,
    uploads: Arc<dyn UploadStore>,
    queue: DeliveryQueue,
}

impl SessionHandler {
    /// Creates a handler using the timeouts and limits from `config`.
    pub fn new(
        config: &ServerConfig,
        uploads: Arc<dyn UploadStore>,
        queue: DeliveryQueue,
    ) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            max_payload_size: config.max_payload_size,
            uploads,
            queue,
        }
    }

    /// Serves one connection until it closes.
    ///
    /// Returns `Ok(())` when the peer disconnects between frames, or the
    /// error that ended the session on either task.
    pub async fn handle_connection(&self, conn: Connection) -> ServerResult<()> {
        let (read_half, write_half, _permit) = conn.into_split();
        self.run_session(read_half, write_half).await
    }

    /// Runs a session over an arbitrary stream pair.
    pub async fn run_session<R, W>(&self, read_half: R, write_half: W) -> ServerResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer = SessionWriter::new(write_half);
        let closed = ShutdownHandle::new();

        let delivery = tokio::spawn(
            run_delivery(self.queue.clone(), writer.clone(), closed.clone())
                .instrument(tracing::Span::current()),
        );

        let mut reader = FrameReader::new(read_half).with_max_payload_size(self.max_payload_size);
        let result = self.read_loop(&mut reader, &writer, &closed).await;

        // The delivery task may be stuck writing to a peer that stopped
        // reading; aborting it releases the write lock.
        closed.trigger();
        delivery.abort();
        let delivered = match delivery.await {
            Ok(delivered) => delivered,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => {
                warn!(error = %e, "Delivery task failed");
                Ok(())
            }
        };
        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "Failed to shut down write side");
        }

        // A reader error wins; otherwise report why delivery closed the
        // connection, if it did.
        result.and(delivered)
    }

    async fn read_loop<R, W>(
        &self,
        reader: &mut FrameReader<R>,
        writer: &SessionWriter<W>,
        closed: &ShutdownHandle,
    ) -> ServerResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send,
    {
        loop {
            let header = tokio::select! {
                biased;
                _ = closed.wait().wait() => {
                    debug!("Connection closed by writer");
                    return Ok(());
                }
                header = self.with_deadline(reader.read_header()) => header?,
            };

            let Some(header) = header else {
                debug!("Client disconnected");
                return Ok(());
            };

            self.dispatch(header, reader, writer).await?;
        }
    }

    async fn dispatch<R, W>(
        &self,
        header: FrameHeader,
        reader: &mut FrameReader<R>,
        writer: &SessionWriter<W>,
    ) -> ServerResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send,
    {
        debug!(frame_type = %header.frame_type, length = header.length, "Received frame");

        match header.frame_type {
            FrameType::Ping => {
                writer.write_frame(&encode_pong()).await?;
            }
            FrameType::Echo => {
                let message = self.with_deadline(reader.read_payload(header.length)).await?;
                debug!(message = %String::from_utf8_lossy(&message), "Echoing message");
                writer.write_frame(&encode_echo(&message)).await?;
            }
            FrameType::File => {
                let file = self
                    .with_deadline(reader.read_file_header(header.length))
                    .await?;
                self.receive_file(reader.get_mut(), &file).await?;
            }
            FrameType::Pong | FrameType::Msg => {
                return Err(ProtocolError::UnexpectedFrame(header.frame_type).into());
            }
        }

        Ok(())
    }

    /// Streams an upload's content into the store.
    ///
    /// No frame is sent back either way. A transfer that fails partway is
    /// discarded.
    async fn receive_file<R>(&self, source: &mut R, file: &FileHeader) -> ServerResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let name = file.name_lossy();
        info!(file = %name, size = file.size, "Receiving file");

        let mut sink = self
            .uploads
            .create(&file.name)
            .await
            .map_err(|e| ServerError::upload(&name, e))?;

        match self.copy_content(source, &mut sink, file.size, &name).await {
            Ok(()) => {
                info!(file = %name, size = file.size, "File saved");
                Ok(())
            }
            Err(e) => {
                drop(sink);
                if let Err(discard_err) = self.uploads.discard(&file.name).await {
                    warn!(file = %name, error = %discard_err, "Failed to remove partial upload");
                }
                Err(e)
            }
        }
    }

    async fn copy_content<R>(
        &self,
        source: &mut R,
        sink: &mut UploadSink,
        size: u64,
        name: &str,
    ) -> ServerResult<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; size.min(UPLOAD_CHUNK_SIZE) as usize];
        let mut remaining = size;

        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let read = self.with_deadline(read_chunk(source, &mut buf[..want])).await?;
            if read == 0 {
                return Err(ServerError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("upload ended after {} of {} bytes", size - remaining, size),
                )));
            }
            sink.write_all(&buf[..read])
                .await
                .map_err(|e| ServerError::upload(name, e))?;
            remaining -= read as u64;
        }

        sink.flush().await.map_err(|e| ServerError::upload(name, e))?;
        sink.shutdown()
            .await
            .map_err(|e| ServerError::upload(name, e))?;
        Ok(())
    }

    /// Bounds a read by the idle timeout.
    async fn with_deadline<T, F>(&self, read: F) -> ServerResult<T>
    where
        F: Future<Output = ProtocolResult<T>>,
    {
        match tokio::time::timeout(self.idle_timeout, read).await {
            Ok(result) => result.map_err(ServerError::from),
            Err(_) => Err(ServerError::IdleTimeout {
                timeout: self.idle_timeout,
            }),
        }
    }
}

async fn read_chunk<R>(source: &mut R, buf: &mut [u8]) -> ProtocolResult<usize>
where
    R: AsyncRead + Unpin,
{
    Ok(source.read(buf).await?)
}

/// Creates a connection handler function for use with [`FrameServer::run`].
///
/// Each connection runs inside a `connection` span; its outcome is logged
/// there and goes no further.
///
/// [`FrameServer::run`]: crate::FrameServer::run
pub fn make_connection_handler(
    handler: Arc<SessionHandler>,
) -> impl Fn(Connection) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
+ Send
+ Sync
+ 'static {
    move |conn| {
        let handler = Arc::clone(&handler);
        let span = info_span!("connection", conn_id = conn.id(), peer = %conn.peer_addr());
        Box::pin(
            async move {
                info!("Connection opened");
                match handler.handle_connection(conn).await {
                    Ok(()) => info!("Connection closed"),
                    Err(e) => match e.kind() {
                        ErrorKind::Protocol => {
                            warn!(error = %e, "Protocol violation, connection closed")
                        }
                        ErrorKind::Filesystem => {
                            warn!(error = %e, "Upload failed, connection closed")
                        }
                        ErrorKind::Transport | ErrorKind::Server => {
                            warn!(error = %e, "Connection terminated")
                        }
                    },
                }
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryHandle, delivery_queue};
    use crate::socket::FrameServer;
    use crate::upload::UploadDir;
    use framelink_protocol::{
        Frame, HEADER_SIZE, encode_file_header, encode_frame, encode_msg, encode_ping,
    };
    use std::net::SocketAddr;
    use tempfile::TempDir;
    use tokio::net::TcpStream;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

    struct TestServer {
        addr: SocketAddr,
        producer: DeliveryHandle,
        dir: TempDir,
    }

    async fn start_server(idle_timeout: Duration) -> TestServer {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new("127.0.0.1:0")
            .with_idle_timeout(idle_timeout)
            .with_upload_dir(dir.path());
        let (producer, queue) = delivery_queue(config.queue_capacity);
        let uploads = Arc::new(UploadDir::new(dir.path()));
        let handler = Arc::new(SessionHandler::new(&config, uploads, queue));

        let server = FrameServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run(make_connection_handler(handler)).await;
        });

        TestServer {
            addr,
            producer,
            dir,
        }
    }

    async fn connect(addr: SocketAddr) -> (FrameReader<OwnedReadHalf>, OwnedWriteHalf) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, write) = stream.into_split();
        (FrameReader::new(read), write)
    }

    async fn next_frame(reader: &mut FrameReader<OwnedReadHalf>) -> Option<Frame> {
        tokio::time::timeout(Duration::from_secs(2), reader.read_frame())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
    }

    async fn assert_closed(reader: &mut FrameReader<OwnedReadHalf>) {
        let result = tokio::time::timeout(Duration::from_secs(2), reader.read_frame())
            .await
            .expect("connection was not closed");
        assert!(matches!(result, Ok(None) | Err(_)), "got {result:?}");
    }

    #[tokio::test]
    async fn ping_yields_pong() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        for _ in 0..3 {
            writer.write_all(&encode_ping()).await.unwrap();
            assert_eq!(next_frame(&mut reader).await, Some(Frame::Pong));
        }
    }

    #[tokio::test]
    async fn pong_has_empty_payload() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        writer.write_all(&encode_ping()).await.unwrap();
        let header = reader.read_header().await.unwrap().unwrap();
        assert_eq!(header, FrameHeader::new(FrameType::Pong, 0));
    }

    #[tokio::test]
    async fn echo_returns_same_payload() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        let binary: Vec<u8> = (0..=255u8).collect();
        for message in [&b"Hello"[..], &b""[..], &binary[..]] {
            writer.write_all(&encode_echo(message)).await.unwrap();
            assert_eq!(
                next_frame(&mut reader).await,
                Some(Frame::Echo(message.to_vec()))
            );
        }
    }

    #[tokio::test]
    async fn file_upload_is_saved_without_response() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        writer
            .write_all(&encode_file_header(content.len() as u64, b"hithere.txt"))
            .await
            .unwrap();
        writer.write_all(&content).await.unwrap();

        // The next frame on the wire must be the reply to this ping, which
        // proves the upload produced no frame of its own.
        writer.write_all(&encode_ping()).await.unwrap();
        assert_eq!(next_frame(&mut reader).await, Some(Frame::Pong));

        let saved = std::fs::read(server.dir.path().join("hithere.txt")).unwrap();
        assert_eq!(saved, content);
    }

    #[tokio::test]
    async fn empty_file_upload() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        writer
            .write_all(&encode_file_header(0, b"empty.txt"))
            .await
            .unwrap();
        writer.write_all(&encode_ping()).await.unwrap();
        assert_eq!(next_frame(&mut reader).await, Some(Frame::Pong));

        let saved = std::fs::read(server.dir.path().join("empty.txt")).unwrap();
        assert!(saved.is_empty());
    }

    #[tokio::test]
    async fn truncated_upload_is_discarded() {
        let server = start_server(Duration::from_millis(200)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        writer
            .write_all(&encode_file_header(100, b"partial.bin"))
            .await
            .unwrap();
        writer.write_all(&[7u8; 40]).await.unwrap();
        drop(writer);

        assert_closed(&mut reader).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!server.dir.path().join("partial.bin").exists());
    }

    #[tokio::test]
    async fn unsafe_file_name_closes_connection() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        writer
            .write_all(&encode_file_header(3, b"../escape.txt"))
            .await
            .unwrap();
        writer.write_all(b"abc").await.unwrap();

        assert_closed(&mut reader).await;
        assert!(!server.dir.path().join("../escape.txt").exists());
    }

    #[tokio::test]
    async fn idle_connection_is_closed() {
        let server = start_server(Duration::from_millis(100)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        // Too late: the server has already given up on this connection.
        let _ = writer.write_all(&encode_ping()).await;
        assert_closed(&mut reader).await;
    }

    #[tokio::test]
    async fn activity_resets_idle_deadline() {
        let server = start_server(Duration::from_millis(200)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            writer.write_all(&encode_ping()).await.unwrap();
            assert_eq!(next_frame(&mut reader).await, Some(Frame::Pong));
        }
    }

    #[tokio::test]
    async fn unknown_type_closes_connection() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        let mut bogus = [0u8; HEADER_SIZE];
        bogus[1] = 0x42;
        writer.write_all(&bogus).await.unwrap();
        let _ = writer.write_all(&encode_ping()).await;

        assert_closed(&mut reader).await;
    }

    #[tokio::test]
    async fn inbound_msg_closes_connection() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        writer.write_all(&encode_msg(b"wrong way")).await.unwrap();
        assert_closed(&mut reader).await;
    }

    #[tokio::test]
    async fn short_file_header_closes_connection() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        let mut frame = encode_frame(FrameType::File, &[1, 2, 3]);
        frame.extend_from_slice(&[0u8; 5]);
        writer.write_all(&frame).await.unwrap();
        assert_closed(&mut reader).await;
    }

    #[tokio::test]
    async fn oversized_echo_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new("127.0.0.1:0")
            .with_upload_dir(dir.path())
            .with_max_payload_size(16);
        let (_producer, queue) = delivery_queue(1);
        let handler = Arc::new(SessionHandler::new(
            &config,
            Arc::new(UploadDir::new(dir.path())),
            queue,
        ));
        let server = FrameServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run(make_connection_handler(handler)).await;
        });

        let (mut reader, mut writer) = connect(addr).await;
        writer.write_all(&encode_echo(&[b'x'; 16])).await.unwrap();
        assert_eq!(
            next_frame(&mut reader).await,
            Some(Frame::Echo(vec![b'x'; 16]))
        );

        writer.write_all(&encode_echo(&[b'x'; 17])).await.unwrap();
        assert_closed(&mut reader).await;
    }

    #[tokio::test]
    async fn failing_connection_does_not_affect_others() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut good_reader, mut good_writer) = connect(server.addr).await;
        let (mut bad_reader, mut bad_writer) = connect(server.addr).await;

        bad_writer.write_all(&encode_msg(b"bad")).await.unwrap();
        assert_closed(&mut bad_reader).await;

        good_writer.write_all(&encode_echo(b"still here")).await.unwrap();
        assert_eq!(
            next_frame(&mut good_reader).await,
            Some(Frame::Echo(b"still here".to_vec()))
        );

        // The listener keeps accepting.
        let (mut new_reader, mut new_writer) = connect(server.addr).await;
        new_writer.write_all(&encode_ping()).await.unwrap();
        assert_eq!(next_frame(&mut new_reader).await, Some(Frame::Pong));
    }

    #[tokio::test]
    async fn async_message_is_delivered_as_msg() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        // Make sure the session is up before submitting.
        writer.write_all(&encode_ping()).await.unwrap();
        assert_eq!(next_frame(&mut reader).await, Some(Frame::Pong));

        server.producer.submit("async message").await.unwrap();
        assert_eq!(
            next_frame(&mut reader).await,
            Some(Frame::Msg(b"async message".to_vec()))
        );
    }

    #[tokio::test]
    async fn async_message_goes_to_exactly_one_session() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut first, mut first_writer) = connect(server.addr).await;
        let (mut second, mut second_writer) = connect(server.addr).await;

        first_writer.write_all(&encode_ping()).await.unwrap();
        second_writer.write_all(&encode_ping()).await.unwrap();
        assert_eq!(next_frame(&mut first).await, Some(Frame::Pong));
        assert_eq!(next_frame(&mut second).await, Some(Frame::Pong));

        server.producer.submit("only once").await.unwrap();

        let mut received = 0;
        for reader in [&mut first, &mut second] {
            if let Ok(frame) =
                tokio::time::timeout(Duration::from_millis(300), reader.read_frame()).await
            {
                assert_eq!(frame.unwrap(), Some(Frame::Msg(b"only once".to_vec())));
                received += 1;
            }
        }
        assert_eq!(received, 1);
    }

    #[tokio::test]
    async fn closed_session_stops_draining_queue() {
        let server = start_server(Duration::from_secs(5)).await;

        let (mut old_reader, old_writer) = connect(server.addr).await;
        drop(old_writer);
        assert_closed(&mut old_reader).await;
        drop(old_reader);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (mut reader, mut writer) = connect(server.addr).await;
        writer.write_all(&encode_ping()).await.unwrap();
        assert_eq!(next_frame(&mut reader).await, Some(Frame::Pong));

        for i in 0..5 {
            let message = format!("message {i}");
            server.producer.submit(message.clone()).await.unwrap();
            assert_eq!(
                next_frame(&mut reader).await,
                Some(Frame::Msg(message.into_bytes()))
            );
        }
    }

    #[tokio::test]
    async fn responses_and_pushes_never_tear() {
        let server = start_server(Duration::from_secs(5)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        writer.write_all(&encode_ping()).await.unwrap();
        assert_eq!(next_frame(&mut reader).await, Some(Frame::Pong));

        let producer = server.producer.clone();
        let pushes = tokio::spawn(async move {
            for _ in 0..50 {
                producer.submit(vec![b'm'; 4096]).await.unwrap();
            }
        });
        let requests = tokio::spawn(async move {
            for _ in 0..50 {
                writer.write_all(&encode_echo(&[b'e'; 4096])).await.unwrap();
            }
            writer
        });

        let (mut echoes, mut msgs) = (0, 0);
        while echoes + msgs < 100 {
            match next_frame(&mut reader).await {
                Some(Frame::Echo(payload)) => {
                    assert_eq!(payload, vec![b'e'; 4096]);
                    echoes += 1;
                }
                Some(Frame::Msg(payload)) => {
                    assert_eq!(payload, vec![b'm'; 4096]);
                    msgs += 1;
                }
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!((echoes, msgs), (50, 50));
        pushes.await.unwrap();
        let _writer = requests.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_file_name_is_saved() {
        use std::os::unix::ffi::OsStrExt;

        let server = start_server(Duration::from_secs(5)).await;
        let (mut reader, mut writer) = connect(server.addr).await;

        let name = b"caf\xe9.txt";
        writer
            .write_all(&encode_file_header(3, name))
            .await
            .unwrap();
        writer.write_all(b"abc").await.unwrap();
        writer.write_all(&encode_ping()).await.unwrap();
        assert_eq!(next_frame(&mut reader).await, Some(Frame::Pong));

        let path = server.dir.path().join(std::ffi::OsStr::from_bytes(name));
        assert_eq!(std::fs::read(path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn session_ends_on_idle_timeout_while_delivery_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::default().with_idle_timeout(Duration::from_millis(200));
        let (producer, queue) = delivery_queue(1);
        let handler = SessionHandler::new(&config, Arc::new(UploadDir::new(dir.path())), queue);

        // The client end stays open but is never read, so the push below
        // cannot fit in the pipe.
        let (_client, server) = tokio::io::duplex(64);
        let (server_read, server_write) = tokio::io::split(server);
        let session =
            tokio::spawn(async move { handler.run_session(server_read, server_write).await });

        producer.submit(vec![b'm'; 4096]).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(3), session)
            .await
            .expect("session outlived its idle timeout")
            .unwrap();
        assert!(matches!(result, Err(ServerError::IdleTimeout { .. })));
    }

    #[tokio::test]
    async fn stalled_client_releases_its_connection_slot() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new("127.0.0.1:0")
            .with_upload_dir(dir.path())
            .with_idle_timeout(Duration::from_millis(200))
            .with_max_connections(1);
        let (producer, queue) = delivery_queue(config.queue_capacity);
        let handler = Arc::new(SessionHandler::new(
            &config,
            Arc::new(UploadDir::new(dir.path())),
            queue,
        ));
        let server = FrameServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run(make_connection_handler(handler)).await;
        });

        // Connected, silent, and never reading.
        let (_stalled_reader, _stalled_writer) = connect(addr).await;
        let pushes = tokio::spawn(async move {
            for _ in 0..256 {
                if producer.submit(vec![b'm'; 64 * 1024]).await.is_err() {
                    return;
                }
            }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        pushes.abort();

        let (mut reader, mut writer) = connect(addr).await;
        writer.write_all(&encode_ping()).await.unwrap();
        loop {
            match next_frame(&mut reader).await {
                Some(Frame::Pong) => break,
                Some(Frame::Msg(_)) => continue,
                other => panic!("unexpected frame {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn failed_delivery_is_the_session_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::default().with_idle_timeout(Duration::from_secs(5));
        let (producer, queue) = delivery_queue(1);
        let handler = SessionHandler::new(&config, Arc::new(UploadDir::new(dir.path())), queue);

        // Reads stay open and quiet while writes go nowhere.
        let (_client_in, server_in) = tokio::io::duplex(64);
        let (client_out, server_out) = tokio::io::duplex(64);
        drop(client_out);
        let session = tokio::spawn(async move { handler.run_session(server_in, server_out).await });

        producer.submit("undeliverable").await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .unwrap()
            .unwrap();
        let err = result.unwrap_err();
        assert!(matches!(err, ServerError::Io(_)), "got {err:?}");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn partial_header_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::default().with_idle_timeout(Duration::from_secs(5));
        let (_producer, queue) = delivery_queue(1);
        let handler = SessionHandler::new(&config, Arc::new(UploadDir::new(dir.path())), queue);

        let (client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let session =
            tokio::spawn(async move { handler.run_session(server_read, server_write).await });

        let (_client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(&encode_ping()[..4]).await.unwrap();
        client_write.shutdown().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .unwrap()
            .unwrap();
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn run_session_over_duplex_stream() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::default().with_idle_timeout(Duration::from_secs(5));
        let (_producer, queue) = delivery_queue(1);
        let handler = SessionHandler::new(&config, Arc::new(UploadDir::new(dir.path())), queue);

        let (client, server) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let session =
            tokio::spawn(async move { handler.run_session(server_read, server_write).await });

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(&encode_echo(b"duplex")).await.unwrap();
        let mut reader = FrameReader::new(client_read);
        assert_eq!(
            reader.read_frame().await.unwrap(),
            Some(Frame::Echo(b"duplex".to_vec()))
        );

        drop(client_write);
        drop(reader);
        let result = tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
