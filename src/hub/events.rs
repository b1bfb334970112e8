//! Events feeding the hub's single-owner loop.
//!
//! Everything that mutates pane, window, or client state arrives as a
//! [`HubEvent`] on one channel: client transport tasks, PTY reader
//! threads, and admin RPC connections all funnel through it. The hub
//! task is therefore the only writer of server state, which is what
//! makes generation counters per pane trivially monotonic.

// Rust guideline compliant 2026-03

use tokio::sync::{mpsc::UnboundedSender, oneshot};

use crate::pty::PtyEvent;
use crate::registry::ClientId;
use crate::socket::AdminRequest;
use crate::ws::ClientCmd;

/// One unit of work for the hub loop.
#[derive(Debug)]
pub enum HubEvent {
    /// A WebSocket client completed its handshake.
    ClientConnected {
        /// Assigned client id.
        id: ClientId,
        /// Channel into the client's writer task.
        sender: UnboundedSender<ClientCmd>,
    },
    /// A text frame arrived from a client.
    ClientMessage {
        /// Sending client.
        id: ClientId,
        /// Raw JSON payload.
        text: String,
    },
    /// A client's transport closed or failed.
    ClientGone {
        /// Departed client.
        id: ClientId,
    },
    /// PTY output or exit from a reader thread.
    Pty(PtyEvent),
    /// An admin RPC command awaiting a reply.
    Admin {
        /// The decoded command.
        request: AdminRequest,
        /// Reply channel back to the socket connection.
        reply: oneshot::Sender<serde_json::Value>,
    },
    /// Graceful shutdown (admin `quit` or SIGINT).
    Shutdown,
}
