//! Serve command: runs the framelink server in the foreground.
//!
//! Wires together the signal handler, the delivery queue, the upload
//! directory and the listener, then blocks until SIGTERM/SIGINT.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use framelink_server::{
    DeliveryHandle, FrameServer, ServerConfig, SessionHandler, SignalHandler, UploadDir,
    delivery_queue, make_connection_handler,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::cli::Cli;
use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Flags of `framelink serve`.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    /// Idle read timeout in milliseconds.
    pub idle_timeout: Option<u64>,
    /// Upload directory.
    pub upload_dir: Option<PathBuf>,
    /// Turn stdin lines into async messages.
    pub stdin_messages: bool,
}

/// Builds the server configuration from the `[server]` table, then the
/// command-line overrides.
pub fn server_config(cli: &Cli, config: &ClientConfig, options: &ServeOptions) -> ServerConfig {
    let mut server_config = config.server.to_server_config();
    if let Some(ref address) = cli.address {
        server_config.address = address.clone();
    }
    if let Some(ms) = options.idle_timeout {
        server_config = server_config.with_idle_timeout(Duration::from_millis(ms));
    }
    if let Some(ref dir) = options.upload_dir {
        server_config = server_config.with_upload_dir(dir);
    }
    server_config
}

/// Starts the server in the foreground.
///
/// Blocks until a shutdown signal is received.
pub async fn run(cli: &Cli, config: &ClientConfig, options: ServeOptions) -> ClientResult<()> {
    let server_config = server_config(cli, config, &options);

    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener();

    let (producer, queue) = delivery_queue(server_config.queue_capacity);
    let uploads = Arc::new(UploadDir::new(&server_config.upload_dir));
    let handler = Arc::new(SessionHandler::new(&server_config, uploads, queue));

    info!(upload_dir = %server_config.upload_dir.display(), "Starting server");
    let server = FrameServer::bind(server_config).await?;

    if options.stdin_messages {
        tokio::spawn(forward_stdin(producer.clone()));
    }

    server
        .run_until_shutdown(
            make_connection_handler(handler),
            signal_handler.shutdown().wait(),
        )
        .await?;

    drop(producer);
    info!("Server stopped");
    Ok(())
}

/// Submits every stdin line as an async message until stdin closes.
async fn forward_stdin(producer: DeliveryHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(length = line.len(), "Queueing message from stdin");
                if let Err(e) = producer.submit(line).await {
                    warn!(error = %e, "Failed to queue message");
                    return;
                }
            }
            Ok(None) => {
                debug!("stdin closed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                return;
            }
        }
    }
}
