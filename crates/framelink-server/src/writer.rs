//! Per-connection frame writer.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use crate::error::ServerResult;

/// Serializes every outbound frame on one connection.
///
/// The write half of the socket sits behind a mutex that is held for the
/// whole of each [`SessionWriter::write_frame`] call, so frames written by
/// the dispatcher and by the delivery task never interleave on the wire.
/// Clones share the same lock.
pub struct SessionWriter<W = OwnedWriteHalf> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for SessionWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> SessionWriter<W> {
    /// Wraps the write side of a connection.
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Writes one fully encoded frame.
    ///
    /// Any error, including a short write, leaves the connection unusable.
    pub async fn write_frame(&self, frame: &[u8]) -> ServerResult<()> {
        let mut writer = self.inner.lock().await;
        writer.write_all(frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Shuts down the write side once any in-flight frame is finished.
    pub async fn shutdown(&self) -> ServerResult<()> {
        let mut writer = self.inner.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}
