//! TCP listener for framelink sessions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// TCP server accepting framelink connections.
pub struct FrameServer {
    /// Server configuration.
    config: ServerConfig,
    /// TCP listener.
    listener: TcpListener,
    /// Semaphore for limiting concurrent connections.
    connection_semaphore: Arc<Semaphore>,
    /// Id handed to the next accepted connection.
    next_id: AtomicU64,
}

impl FrameServer {
    /// Validates the configuration and binds the listener.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;

        let listener =
            TcpListener::bind(&config.address)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: config.address.clone(),
                    source,
                })?;
        info!(
            addr = %listener.local_addr()?,
            idle_timeout = ?config.idle_timeout,
            "Frame server listening"
        );

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            connection_semaphore,
            next_id: AtomicU64::new(1),
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accepts a single connection.
    ///
    /// Waits for a free connection slot before accepting.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServerError::config("connection limiter closed"))?;

        let (stream, peer) = self.listener.accept().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(conn_id = id, peer = %peer, "Accepted new connection");

        Ok(Connection {
            id,
            peer,
            stream,
            _permit: permit,
        })
    }

    /// Runs the accept loop, spawning `handler` for each connection.
    ///
    /// Runs until the task is dropped. Failures inside a connection stay in
    /// that connection's task; accept failures are logged and retried.
    pub async fn run<F, Fut>(&self, handler: F) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.accept().await {
                Ok(connection) => {
                    let fut = handler(connection);
                    tokio::spawn(fut);
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Connections already running are left to finish on their own.
    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
        S: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(handler) => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

/// An accepted client connection.
///
/// Holds one connection slot until it is dropped.
pub struct Connection {
    id: u64,
    peer: SocketAddr,
    stream: TcpStream,
    _permit: OwnedSemaphorePermit,
}

impl Connection {
    /// Returns the connection id, unique within this server.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Splits the connection into its read and write halves.
    ///
    /// The returned permit keeps the connection slot occupied; drop it when
    /// the connection is finished.
    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf, OwnedSemaphorePermit) {
        let (read, write) = self.stream.into_split();
        (read, write, self._permit)
    }
}
