//! Client subcommands: ping, echo, upload and listen.

use std::path::Path;
use std::time::{Duration, Instant};

use framelink_protocol::{Frame, FrameReader};
use serde::Serialize;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, info};

use super::emit;
use crate::cli::Cli;
use crate::client::{FrameClient, Response};
use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Where and how the client subcommands connect.
#[derive(Debug, Clone)]
pub struct Target {
    /// Server address.
    pub address: String,
    /// Connection timeout.
    pub timeout: Duration,
    /// Ping interval while listening.
    pub keepalive: Duration,
}

impl Target {
    /// Combines CLI flags with the `[client]` table; flags win.
    pub fn resolve(cli: &Cli, config: &ClientConfig) -> Self {
        Self {
            address: cli
                .address
                .clone()
                .unwrap_or_else(|| config.client.address.clone()),
            timeout: Duration::from_secs(cli.timeout.unwrap_or(config.client.timeout)),
            keepalive: Duration::from_millis(config.client.keepalive_ms.max(1)),
        }
    }

    async fn connect(&self) -> ClientResult<FrameClient> {
        FrameClient::connect(&self.address, self.timeout).await
    }
}

#[derive(Serialize)]
struct PingRecord {
    seq: u32,
    peer: String,
    rtt_ms: f64,
}

#[derive(Serialize)]
struct UploadRecord<'a> {
    file: &'a str,
    bytes: u64,
}

/// Sends `count` pings, one at a time.
pub async fn ping(target: &Target, count: u32, json: bool) -> ClientResult<()> {
    let mut client = target.connect().await?;
    let peer = client.peer_addr().to_string();

    for seq in 1..=count {
        let started = Instant::now();
        client.ping().await?;
        let rtt_ms = started.elapsed().as_secs_f64() * 1000.0;

        let text = format!("pong from {}: seq={} time={:.3} ms", peer, seq, rtt_ms);
        emit(
            &PingRecord {
                seq,
                peer: peer.clone(),
                rtt_ms,
            },
            text,
            json,
        )?;
    }

    print_held_messages(client, json)
}

/// Echoes `message` and prints the reply.
pub async fn echo(target: &Target, message: &str, json: bool) -> ClientResult<()> {
    let mut client = target.connect().await?;
    let reply = Response::Echo(client.echo(message.as_bytes()).await?);
    emit(&reply.record(), &reply, json)?;
    print_held_messages(client, json)
}

/// Uploads the file at `path`.
///
/// Uploads are never acknowledged, so a ping follows the content: its pong
/// can only arrive after the server has consumed the whole upload.
pub async fn upload(target: &Target, path: &Path, json: bool) -> ClientResult<()> {
    let mut client = target.connect().await?;
    let bytes = client.upload_file(path).await?;
    client.ping().await?;

    let file = path.display().to_string();
    emit(
        &UploadRecord { file: &file, bytes },
        format!("uploaded {} ({} bytes)", file, bytes),
        json,
    )?;
    print_held_messages(client, json)
}

/// Prints pushed messages until `count` have arrived or the server hangs up.
///
/// Pings go out every `target.keepalive` so the server's idle timeout does
/// not close the connection.
pub async fn listen(target: &Target, count: Option<usize>, json: bool) -> ClientResult<()> {
    let client = target.connect().await?;
    info!(peer = %client.peer_addr(), "listening for messages");

    let (mut reader, mut writer, held) = client.into_parts();
    let mut received = 0;
    for message in held {
        if count.is_some_and(|limit| received >= limit) {
            return Ok(());
        }
        print_message(message, json)?;
        received += 1;
    }

    let period = target.keepalive;
    let keepalive = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            interval.tick().await;
            if writer.write_frame(&Frame::Ping).await.is_err() || writer.flush().await.is_err() {
                debug!("keepalive stopped");
                return;
            }
        }
    });

    let result = receive_messages(&mut reader, count, received, json).await;
    keepalive.abort();
    result
}

async fn receive_messages(
    reader: &mut FrameReader<OwnedReadHalf>,
    count: Option<usize>,
    mut received: usize,
    json: bool,
) -> ClientResult<()> {
    while !count.is_some_and(|limit| received >= limit) {
        let Some(frame) = reader.read_frame().await? else {
            info!("server closed the connection");
            return Ok(());
        };
        match Response::try_from(frame)? {
            Response::Msg(message) => {
                print_message(message, json)?;
                received += 1;
            }
            other => debug!(response = %other, "ignoring response"),
        }
    }
    Ok(())
}

fn print_message(message: Vec<u8>, json: bool) -> ClientResult<()> {
    let response = Response::Msg(message);
    emit(&response.record(), &response, json)
}

/// Prints messages that were pushed while waiting for a reply.
fn print_held_messages(client: FrameClient, json: bool) -> ClientResult<()> {
    let (_, _, held) = client.into_parts();
    for message in held {
        print_message(message, json)?;
    }
    Ok(())
}
