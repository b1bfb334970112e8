//! Admin RPC client used by the CLI subcommands.
//!
//! Connects to the running server's control socket, sends one request
//! frame, and waits for the JSON reply (bounded by the shared admin
//! timeout).

// Rust guideline compliant 2026-03

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::config;
use crate::protocol::ADMIN_TIMEOUT;

use super::framing::{Frame, FrameDecoder};
use super::AdminRequest;

/// Send one admin request to the running server and return its reply.
///
/// # Errors
///
/// Returns an error when no server is listening, the transport fails,
/// or the reply does not arrive within the timeout.
pub async fn request(request: &AdminRequest) -> Result<serde_json::Value> {
    let path = config::socket_path()?;
    let stream = UnixStream::connect(&path).await.with_context(|| {
        format!(
            "Failed to connect to {} (is the server running?)",
            path.display()
        )
    })?;
    request_on(stream, request).await
}

/// [`request`] against an already-connected stream (tests).
pub async fn request_on(
    mut stream: UnixStream,
    request: &AdminRequest,
) -> Result<serde_json::Value> {
    let payload = serde_json::to_value(request).context("Failed to serialize request")?;
    stream
        .write_all(&Frame::Json(payload).encode())
        .await
        .context("Failed to send admin request")?;

    let reply = tokio::time::timeout(ADMIN_TIMEOUT, read_reply(&mut stream))
        .await
        .context("Admin request timed out")??;
    Ok(reply)
}

async fn read_reply(stream: &mut UnixStream) -> Result<serde_json::Value> {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream
            .read(&mut buf)
            .await
            .context("Failed to read admin reply")?;
        if n == 0 {
            bail!("connection closed before a reply arrived");
        }
        for frame in decoder.feed(&buf[..n])? {
            if let Frame::Json(value) = frame {
                return Ok(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::events::HubEvent;
    use crate::socket::server::AdminServer;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn client_round_trips_against_server() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("admin.sock");

        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let HubEvent::Admin { reply, .. } = event {
                    let _ = reply.send(serde_json::json!({"ok": true, "pong": true}));
                }
            }
        });
        let server = AdminServer::start(path.clone(), tx).expect("start");

        let stream = UnixStream::connect(&path).await.expect("connect");
        let reply = request_on(stream, &AdminRequest::Ping).await.expect("reply");
        assert_eq!(reply["pong"], serde_json::json!(true));
        server.shutdown();
    }
}
