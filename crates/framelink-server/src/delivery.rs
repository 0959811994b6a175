//! Process-wide async delivery queue.
//!
//! Producers push messages through a [`DeliveryHandle`]. Every live
//! connection runs a delivery task that competes for messages on the shared
//! [`DeliveryQueue`], so each message reaches exactly one session: whichever
//! task receives it first. This is not a broadcast.
//!
//! The queue closes once every handle has been dropped; delivery tasks then
//! stop on their own.

use std::sync::Arc;

use framelink_protocol::encode_msg;
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::error::{ServerError, ServerResult};
use crate::signals::ShutdownHandle;
use crate::writer::SessionWriter;

/// Creates a delivery queue with room for `capacity` pending messages.
///
/// A capacity of zero is treated as one.
pub fn delivery_queue(capacity: usize) -> (DeliveryHandle, DeliveryQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        DeliveryHandle { tx },
        DeliveryQueue {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer side of the delivery queue.
#[derive(Debug, Clone)]
pub struct DeliveryHandle {
    tx: mpsc::Sender<Vec<u8>>,
}

impl DeliveryHandle {
    /// Submits a message, waiting for a free slot.
    ///
    /// There is no acknowledgment: success means the message is queued,
    /// not that any session received it.
    pub async fn submit(&self, message: impl Into<Vec<u8>>) -> ServerResult<()> {
        self.tx
            .send(message.into())
            .await
            .map_err(|_| ServerError::QueueClosed)
    }

    /// Submits a message without waiting.
    pub fn try_submit(&self, message: impl Into<Vec<u8>>) -> ServerResult<()> {
        self.tx.try_send(message.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ServerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ServerError::QueueClosed,
        })
    }

    /// Returns true if the consumer side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the delivery queue, shared by all connections.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    rx: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
}

impl DeliveryQueue {
    /// Waits for the next message.
    ///
    /// Returns `None` once every [`DeliveryHandle`] is dropped and the queue
    /// is drained. Cancel-safe: dropping the future never loses a message.
    pub async fn recv(&self) -> Option<Vec<u8>> {
        self.rx.lock().await.recv().await
    }
}

/// Drains `queue` into `writer` as Msg frames until the queue closes or the
/// connection does.
///
/// A failed write closes the connection and is returned. The task may be
/// aborted mid-write once the connection is closed.
pub(crate) async fn run_delivery<W>(
    queue: DeliveryQueue,
    writer: SessionWriter<W>,
    closed: ShutdownHandle,
) -> ServerResult<()>
where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let message = tokio::select! {
            biased;
            _ = closed.wait().wait() => {
                debug!("Connection closed, delivery stopped");
                return Ok(());
            }
            message = queue.recv() => message,
        };

        let Some(message) = message else {
            debug!("Delivery queue closed");
            return Ok(());
        };

        debug!(length = message.len(), "Delivering async message");
        if let Err(e) = writer.write_frame(&encode_msg(&message)).await {
            debug!(error = %e, "Failed to deliver async message");
            closed.trigger();
            return Err(e);
        }
    }
}
