//! Session engine for the framelink protocol.
//!
//! This crate provides the server side of a framelink connection:
//! - TCP listener with a bounded number of concurrent connections
//! - Per-connection frame dispatch (ping, echo, file upload) with an
//!   idle-read deadline
//! - A process-wide delivery queue whose messages are pushed to connected
//!   sessions as Msg frames
//! - A write lock per connection so responses and pushes never interleave
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use framelink_server::{
//!     FrameServer, ServerConfig, SessionHandler, UploadDir, delivery_queue,
//!     make_connection_handler,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let (producer, queue) = delivery_queue(config.queue_capacity);
//!     let uploads = Arc::new(UploadDir::new(&config.upload_dir));
//!     let handler = Arc::new(SessionHandler::new(&config, uploads, queue));
//!
//!     let server = FrameServer::bind(config).await?;
//!     tokio::spawn(async move {
//!         let _ = producer.submit("hello from the server").await;
//!     });
//!     server.run(make_connection_handler(handler)).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod delivery;
mod error;
mod handler;
mod signals;
mod socket;
mod upload;
mod writer;

pub use config::ServerConfig;
pub use delivery::{DeliveryHandle, DeliveryQueue, delivery_queue};
pub use error::{ErrorKind, ServerError, ServerResult};
pub use handler::{SessionHandler, make_connection_handler};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use socket::{Connection, FrameServer};
pub use upload::{BoxFuture, UploadDir, UploadSink, UploadStore};
pub use writer::SessionWriter;
