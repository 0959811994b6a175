//! Demo command: a complete session against an in-process server.
//!
//! Runs ping, echo, an upload and one async push over loopback, printing
//! each response, then checks the uploaded copy against the source.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use framelink_server::{
    DeliveryHandle, FrameServer, SessionHandler, UploadDir, delivery_queue,
    make_connection_handler,
};
use serde::Serialize;
use tracing::info;

use super::emit;
use crate::client::{FrameClient, Response};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Async message pushed during the demo.
const DEMO_MESSAGE: &str = "async message";

#[derive(Serialize)]
struct VerifyRecord<'a> {
    file: &'a str,
    bytes: u64,
    verified: bool,
}

/// Runs the demo, uploading `file` into `upload_dir` (or the configured
/// upload directory).
pub async fn run(
    config: &ClientConfig,
    file: &Path,
    upload_dir: Option<PathBuf>,
    json: bool,
) -> ClientResult<()> {
    let mut server_config = config.server.to_server_config();
    server_config.address = "127.0.0.1:0".to_string();
    if let Some(dir) = upload_dir {
        server_config = server_config.with_upload_dir(dir);
    }
    let upload_root = server_config.upload_dir.clone();

    let (producer, queue) = delivery_queue(server_config.queue_capacity);
    let handler = Arc::new(SessionHandler::new(
        &server_config,
        Arc::new(UploadDir::new(&upload_root)),
        queue,
    ));
    let server = FrameServer::bind(server_config).await?;
    let addr = server.local_addr()?.to_string();
    let server_task = tokio::spawn(async move {
        let _ = server.run(make_connection_handler(handler)).await;
    });
    info!(addr = %addr, "demo server started");

    let timeout = Duration::from_secs(config.client.timeout);
    let result = run_scenario(&addr, timeout, &producer, file, &upload_root, json).await;

    server_task.abort();
    result
}

async fn run_scenario(
    addr: &str,
    timeout: Duration,
    producer: &DeliveryHandle,
    file: &Path,
    upload_root: &Path,
    json: bool,
) -> ClientResult<()> {
    let mut client = FrameClient::connect(addr, timeout).await?;

    client.send_ping().await?;
    print_next(&mut client, json).await?;

    client.send_echo(b"Hello").await?;
    print_next(&mut client, json).await?;

    let bytes = client.upload_file(file).await?;

    producer.submit(DEMO_MESSAGE).await?;
    print_next(&mut client, json).await?;

    // Replies are in order, so this pong means the upload was consumed.
    client.ping().await?;
    verify_upload(file, upload_root, bytes, json)
}

async fn print_next(client: &mut FrameClient, json: bool) -> ClientResult<()> {
    let response = client
        .read_response()
        .await?
        .ok_or_else(|| ClientError::Connection("server closed the connection".into()))?;
    emit(&response.record(), &response, json)
}

fn verify_upload(source: &Path, upload_root: &Path, bytes: u64, json: bool) -> ClientResult<()> {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let copy = upload_root.join(&name);

    let verified = std::fs::read(source)? == std::fs::read(&copy)?;
    let copy_display = copy.display().to_string();
    emit(
        &VerifyRecord {
            file: &copy_display,
            bytes,
            verified,
        },
        format!(
            "file: {} ({} bytes) {}",
            copy_display,
            bytes,
            if verified { "matches" } else { "DIFFERS" }
        ),
        json,
    )?;

    if verified {
        Ok(())
    } else {
        Err(ClientError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} does not match {}", copy_display, source.display()),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_runs_full_scenario() {
        let source_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("hithere.txt");
        std::fs::write(&source, b"hi there\n").unwrap();
        let upload_dir = tempfile::tempdir().unwrap();

        run(
            &ClientConfig::default(),
            &source,
            Some(upload_dir.path().to_path_buf()),
            false,
        )
        .await
        .unwrap();

        assert_eq!(
            std::fs::read(upload_dir.path().join("hithere.txt")).unwrap(),
            b"hi there\n"
        );
    }

    #[tokio::test]
    async fn demo_with_missing_file_fails() {
        let upload_dir = tempfile::tempdir().unwrap();
        let result = run(
            &ClientConfig::default(),
            &upload_dir.path().join("missing.txt"),
            Some(upload_dir.path().to_path_buf()),
            true,
        )
        .await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }
}
