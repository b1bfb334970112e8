//! Unix domain socket server for admin RPC connections.
//!
//! Listens on the runtime-directory socket and spawns a task per
//! connection. Each JSON frame is decoded into an [`AdminRequest`],
//! forwarded to the hub with a oneshot reply channel, and answered on
//! the same connection — or failed with a timeout error if the hub does
//! not reply within [`ADMIN_TIMEOUT`].

// Rust guideline compliant 2026-03

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::hub::events::HubEvent;
use crate::protocol::ADMIN_TIMEOUT;

use super::framing::{Frame, FrameDecoder};
use super::AdminRequest;

/// Unix domain socket server for admin RPC.
#[derive(Debug)]
pub struct AdminServer {
    socket_path: PathBuf,
    accept_handle: JoinHandle<()>,
}

impl AdminServer {
    /// Start the admin server at the given path.
    ///
    /// Removes any stale socket file, binds the listener, sets
    /// permissions to 0600, and spawns the accept loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is too long for `sun_path` or the
    /// socket cannot be bound.
    pub fn start(socket_path: PathBuf, hub_tx: UnboundedSender<HubEvent>) -> Result<Self> {
        // sun_path is 104 bytes on macOS, 108 on Linux; use the smaller.
        const MAX_SOCKET_PATH: usize = 104;
        let path_len = socket_path.as_os_str().len();
        if path_len >= MAX_SOCKET_PATH {
            anyhow::bail!(
                "Socket path too long ({path_len} bytes, max {}): {}",
                MAX_SOCKET_PATH - 1,
                socket_path.display()
            );
        }

        if socket_path.exists() {
            std::fs::remove_file(&socket_path).with_context(|| {
                format!("Failed to remove stale socket: {}", socket_path.display())
            })?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind socket: {}", socket_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| {
                    format!("Failed to set socket permissions: {}", socket_path.display())
                })?;
        }

        log::info!("Admin socket listening at {}", socket_path.display());
        let accept_handle = tokio::spawn(accept_loop(listener, hub_tx));

        Ok(Self {
            socket_path,
            accept_handle,
        })
    }

    /// Stop accepting connections and remove the socket file.
    pub fn shutdown(self) {
        self.accept_handle.abort();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn accept_loop(listener: UnixListener, hub_tx: UnboundedSender<HubEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                tokio::spawn(handle_connection(stream, hub_tx.clone()));
            }
            Err(e) => {
                log::warn!("Admin socket accept failed: {e}");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

/// Serve one admin connection until EOF or a protocol error.
async fn handle_connection(mut stream: UnixStream, hub_tx: UnboundedSender<HubEvent>) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                log::debug!("Admin connection read error: {e}");
                break;
            }
        };
        let frames = match decoder.feed(&buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                log::warn!("Admin connection protocol error: {e}");
                break;
            }
        };
        for frame in frames {
            let Frame::Json(value) = frame else {
                continue;
            };
            let response = dispatch(value, &hub_tx).await;
            let encoded = Frame::Json(response).encode();
            if let Err(e) = stream.write_all(&encoded).await {
                log::debug!("Admin connection write error: {e}");
                return;
            }
        }
    }
}

/// Route one request to the hub and await its reply.
async fn dispatch(value: serde_json::Value, hub_tx: &UnboundedSender<HubEvent>) -> serde_json::Value {
    let request: AdminRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return serde_json::json!({"ok": false, "error": format!("bad request: {e}")});
        }
    };
    let (reply_tx, reply_rx) = oneshot::channel();
    if hub_tx
        .send(HubEvent::Admin {
            request,
            reply: reply_tx,
        })
        .is_err()
    {
        return serde_json::json!({"ok": false, "error": "server shutting down"});
    }
    match tokio::time::timeout(ADMIN_TIMEOUT, reply_rx).await {
        Ok(Ok(response)) => response,
        Ok(Err(_)) => serde_json::json!({"ok": false, "error": "server dropped the request"}),
        Err(_) => serde_json::json!({"ok": false, "error": "request timed out"}),
    }
}
