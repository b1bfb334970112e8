//! Server bootstrap and the hub event loop.
//!
//! Startup order matters for the exit-code contract: TLS material is
//! validated first, then the WebSocket port is bound, then the initial
//! session (debug pane + first shell) is spawned. Each failure class
//! carries a [`StartupError`] marker in its context chain so `main` can
//! map it to the documented exit code.
//!
//! The loop itself is fully event-driven via `tokio::select!`: the
//! unified [`HubEvent`] channel, the PTY output channel, the 15 ms
//! replication tick, and SIGINT.

// Rust guideline compliant 2026-03

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::{self, ServerConfig};
use crate::encode::FrameCompressor;
use crate::registry::ClientId;
use crate::socket::AdminServer;
use crate::ws::{self, ClientCmd, WsMessage, WsWriter};

use super::events::HubEvent;
use super::Hub;

/// Interval of the generation-vs-subscription scan.
const REPLICATION_TICK: Duration = Duration::from_millis(15);

/// Startup failure classes, mapped to exit codes by `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupError {
    /// The WebSocket port could not be bound.
    Bind,
    /// TLS certificate/key material failed validation.
    Cert,
    /// The initial shell pane could not be spawned.
    Spawn,
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind => write!(f, "failed to bind the listen port"),
            Self::Cert => write!(f, "failed to load TLS material"),
            Self::Spawn => write!(f, "failed to spawn the initial pane"),
        }
    }
}

impl std::error::Error for StartupError {}

/// Run the server until `quit` or SIGINT. Blocks the calling task.
///
/// # Errors
///
/// Returns an error when startup fails (bind, TLS material, initial
/// spawn) or the runtime directory is unusable.
pub async fn run(config: ServerConfig) -> Result<()> {
    if config.cert.is_some() != config.key.is_some() {
        return Err(anyhow::anyhow!("--cert and --key must be given together")
            .context(StartupError::Cert));
    }
    if let (Some(cert), Some(key)) = (&config.cert, &config.key) {
        config::validate_tls_material(cert, key).context(StartupError::Cert)?;
    }

    config::cleanup_stale_files();
    if config::is_server_running() {
        anyhow::bail!("a dullahan server is already running for this user");
    }

    // Loopback only; remote access goes through a fronting proxy.
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))
        .context(StartupError::Bind)?;

    let templates = config::load_layout_templates()?;
    let (hub_tx, mut hub_rx) = mpsc::unbounded_channel();
    let mut hub = Hub::new(config, templates);
    hub.init_session().context(StartupError::Spawn)?;

    config::write_pid_file()?;
    let admin = AdminServer::start(config::socket_path()?, hub_tx.clone())?;

    let accept_handle = tokio::spawn(accept_loop(listener, hub_tx.clone()));
    let mut pty_rx = hub.take_pty_rx().context("PTY receiver already taken")?;
    let mut tick = tokio::time::interval(REPLICATION_TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    log::info!("listening on ws://{addr}");
    loop {
        tokio::select! {
            Some(event) = hub_rx.recv() => {
                if !hub.handle_event(event) {
                    break;
                }
            }
            Some(event) = pty_rx.recv() => {
                hub.handle_event(HubEvent::Pty(event));
            }
            _ = tick.tick() => {
                hub.replicate();
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupt received, shutting down");
                break;
            }
        }
    }

    accept_handle.abort();
    hub.shutdown();
    admin.shutdown();
    config::remove_runtime_files();
    log::info!("clean shutdown");
    Ok(())
}

/// Accept WebSocket connections and hand each to its own task pair.
async fn accept_loop(listener: TcpListener, hub_tx: UnboundedSender<HubEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                log::debug!("incoming connection from {peer}");
                tokio::spawn(client_task(stream, hub_tx.clone()));
            }
            Err(e) => {
                log::warn!("accept failed: {e}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Read side of one client connection.
///
/// Spawns the paired writer task, forwards text frames to the hub, and
/// reports the client gone when the transport closes for any reason.
async fn client_task(stream: TcpStream, hub_tx: UnboundedSender<HubEvent>) {
    let (writer, mut reader) = match ws::accept(stream).await {
        Ok(pair) => pair,
        Err(e) => {
            log::debug!("handshake failed: {e:#}");
            return;
        }
    };
    let id = ClientId::new();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let writer_handle = tokio::spawn(writer_task(writer, cmd_rx));

    if hub_tx
        .send(HubEvent::ClientConnected {
            id,
            sender: cmd_tx.clone(),
        })
        .is_err()
    {
        return;
    }

    while let Some(result) = reader.recv().await {
        match result {
            Ok(WsMessage::Text(text)) => {
                if hub_tx.send(HubEvent::ClientMessage { id, text }).is_err() {
                    break;
                }
            }
            Ok(WsMessage::Ping(payload)) => {
                let _ = cmd_tx.send(ClientCmd::Pong(payload));
            }
            // Clients never send binary; pongs are informational.
            Ok(WsMessage::Binary(_) | WsMessage::Pong(_)) => {}
            Ok(WsMessage::Close { code, reason }) => {
                log::debug!("client {id} closed ({code}: {reason})");
                break;
            }
            Err(e) => {
                log::debug!("client {id} transport error: {e:#}");
                break;
            }
        }
    }

    let _ = hub_tx.send(HubEvent::ClientGone { id });
    let _ = cmd_tx.send(ClientCmd::Close);
    let _ = writer_handle.await;
}

/// Write side of one client connection.
///
/// Owns the per-client compressor so the deflate dictionary follows the
/// exact frame order this client observes.
async fn writer_task(mut writer: WsWriter, mut rx: UnboundedReceiver<ClientCmd>) {
    let mut compressor = FrameCompressor::new();
    while let Some(cmd) = rx.recv().await {
        match cmd {
            ClientCmd::Frame(bytes) => match compressor.compress(&bytes) {
                Ok(data) => {
                    if writer.send_binary(data).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("frame compression failed, dropping client: {e:#}");
                    break;
                }
            },
            ClientCmd::Pong(payload) => {
                if writer.send_pong(payload).await.is_err() {
                    break;
                }
            }
            ClientCmd::Close => {
                let _ = writer.close().await;
                break;
            }
        }
    }
}
