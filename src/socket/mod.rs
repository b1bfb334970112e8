//! Unix domain socket admin RPC.
//!
//! A separate control surface from the WebSocket endpoint: scripts and
//! the CLI subcommands talk to a running server over a socket in the
//! per-user runtime directory, using the length-prefixed JSON framing in
//! [`framing`]. Commands are answered within
//! [`crate::protocol::ADMIN_TIMEOUT`].

// Rust guideline compliant 2026-03

pub mod client;
pub mod framing;
pub mod server;

use serde::{Deserialize, Serialize};

pub use framing::{Frame, FrameDecoder};
pub use server::AdminServer;

/// Admin commands accepted over the control socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "kebab-case")]
pub enum AdminRequest {
    /// Liveness probe.
    Ping,
    /// Server status: version, panes, clients.
    Status,
    /// List panes with geometry and generation.
    Panes,
    /// Write text into a pane as if typed.
    #[serde(rename_all = "camelCase")]
    SendText {
        /// Target pane.
        pane: u16,
        /// Text to deliver.
        text: String,
    },
    /// Dump the window/layout tree.
    Layout,
    /// Graceful shutdown.
    Quit,
}
