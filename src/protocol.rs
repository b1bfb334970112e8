//! Client-to-server protocol messages.
//!
//! Clients send text WebSocket frames carrying one JSON object each.
//! Every message except `hello` and `ping` addresses a pane. This module
//! provides the typed view over those payloads; routing and the master
//! filter live in the hub.
//!
//! Server-to-client frames travel the other direction as compressed
//! MessagePack (see [`crate::encode`]); the `type` values they carry are
//! `snapshot`, `delta`, `pong`, `layout`, `pane-added`, `pane-closed`,
//! and `master-changed`.

// Rust guideline compliant 2026-03

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::pane::PaneId;

/// Default WebSocket listen port.
pub const DEFAULT_PORT: u16 = 7681;

/// Default scrollback retained per pane, in rows.
pub const DEFAULT_SCROLLBACK: usize = 5_000;

/// Admin RPC command timeout.
pub const ADMIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Key transition carried by `key` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyState {
    /// Key pressed (or auto-repeated).
    Down,
    /// Key released; never produces PTY bytes.
    Up,
}

/// Modifier flags carried by `key` messages.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Modifiers {
    /// Control held.
    pub ctrl: bool,
    /// Alt/Option held.
    pub alt: bool,
    /// Shift held.
    pub shift: bool,
    /// Meta/Command held.
    pub meta: bool,
}

impl Modifiers {
    /// xterm modifier parameter: `1 + shift + 2·alt + 4·ctrl + 8·meta`.
    #[must_use]
    pub fn xterm_code(self) -> u8 {
        1 + u8::from(self.shift)
            + 2 * u8::from(self.alt)
            + 4 * u8::from(self.ctrl)
            + 8 * u8::from(self.meta)
    }

    /// Whether any modifier is held.
    #[must_use]
    pub fn any(self) -> bool {
        self.ctrl || self.alt || self.shift || self.meta
    }
}

/// One decoded client message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Keyboard event, translated to PTY bytes by [`crate::input`].
    #[serde(rename_all = "camelCase")]
    Key {
        /// Addressed pane.
        pane_id: PaneId,
        /// Browser `KeyboardEvent.key` value.
        key: String,
        /// Browser `KeyboardEvent.code` value.
        #[serde(default)]
        code: String,
        /// Legacy numeric key code.
        #[serde(default)]
        key_code: u32,
        /// Press or release.
        state: KeyState,
        /// Held modifiers.
        #[serde(default)]
        modifiers: Modifiers,
        /// Auto-repeat flag.
        #[serde(default)]
        repeat: bool,
        /// Client-side event timestamp (milliseconds).
        #[serde(default)]
        timestamp: u64,
    },
    /// Pre-composed text (IME commits, emoji pickers).
    #[serde(rename_all = "camelCase")]
    Text {
        /// Addressed pane.
        pane_id: PaneId,
        /// UTF-8 text to deliver.
        data: String,
    },
    /// Pane geometry change (mutating).
    #[serde(rename_all = "camelCase")]
    Resize {
        /// Addressed pane.
        pane_id: PaneId,
        /// New column count.
        cols: u16,
        /// New row count.
        rows: u16,
    },
    /// Viewport scroll (mutating).
    #[serde(rename_all = "camelCase")]
    Scroll {
        /// Addressed pane.
        pane_id: PaneId,
        /// Signed line delta; positive scrolls into history.
        delta: i64,
    },
    /// Update request carrying the client's replication state.
    #[serde(rename_all = "camelCase")]
    Sync {
        /// Addressed pane.
        pane_id: PaneId,
        /// Last generation the client applied.
        gen: u64,
        /// Oldest row id in the client's cache.
        min_row_id: u64,
    },
    /// The client admits cache loss; the next update must be a snapshot.
    #[serde(rename_all = "camelCase")]
    Resync {
        /// Addressed pane.
        pane_id: PaneId,
    },
    /// Local focus hint (read-only).
    #[serde(rename_all = "camelCase")]
    Focus {
        /// Focused pane.
        pane_id: PaneId,
    },
    /// Initial greeting.
    #[serde(rename_all = "camelCase")]
    Hello {
        /// Theme name the client renders with.
        #[serde(default)]
        theme_name: Option<String>,
        /// Preferred foreground color (CSS form).
        #[serde(default)]
        theme_fg: Option<String>,
        /// Preferred background color (CSS form).
        #[serde(default)]
        theme_bg: Option<String>,
    },
    /// Liveness probe; answered with a `pong` frame.
    Ping,
}

impl ClientMessage {
    /// Parse a text frame into a message.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON or unknown message types; the
    /// hub treats that as a protocol error and closes the client.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("malformed client message")
    }

    /// Whether this message mutates pane state and is subject to the
    /// master filter.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Key { .. } | Self::Text { .. } | Self::Resize { .. } | Self::Scroll { .. }
        )
    }

    /// The pane this message addresses, if any.
    #[must_use]
    pub fn pane_id(&self) -> Option<PaneId> {
        match self {
            Self::Key { pane_id, .. }
            | Self::Text { pane_id, .. }
            | Self::Resize { pane_id, .. }
            | Self::Scroll { pane_id, .. }
            | Self::Sync { pane_id, .. }
            | Self::Resync { pane_id }
            | Self::Focus { pane_id } => Some(*pane_id),
            Self::Hello { .. } | Self::Ping => None,
        }
    }
}
