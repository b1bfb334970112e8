//! Hub: the single owner of all replicated server state.
//!
//! Panes, windows, and the client registry live here, mutated only by
//! the hub task draining [`HubEvent`]s. PTY reader threads and client
//! transport tasks communicate exclusively through channels, so pane
//! generations are monotonic by construction and the encoder never
//! races a write.
//!
//! ```text
//! accept task ──┐
//! client tasks ─┤                       ┌─▶ pane feeds / input routing
//! PTY readers ──┼──▶ HubEvent channel ──┼─▶ master arbitration
//! admin socket ─┤                       └─▶ structural broadcasts
//! 15ms tick ────┘                            │
//!                    replication scan ◀──────┘
//! ```

// Rust guideline compliant 2026-03

pub mod commands;
pub mod events;
pub mod run;

use std::collections::HashMap;
use std::io::Write as _;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::config::{self, ServerConfig};
use crate::encode;
use crate::layout::{LayoutNode, Window};
use crate::pane::{Pane, PaneId, DEBUG_PANE};
use crate::pty::{PtyEvent, PtyProcess};
use crate::registry::{ClientId, ClientRegistry, SubState};
use crate::socket::AdminRequest;
use crate::ws::ClientCmd;

use events::HubEvent;

/// Central server state, owned by the event-loop task.
#[derive(Debug)]
pub struct Hub {
    config: ServerConfig,
    panes: HashMap<PaneId, Pane>,
    next_pane_id: PaneId,
    windows: Vec<Window>,
    next_window_id: u16,
    templates: HashMap<String, LayoutNode>,
    /// Connected clients and master assignments.
    pub registry: ClientRegistry,
    pty_tx: UnboundedSender<PtyEvent>,
    pty_rx: Option<UnboundedReceiver<PtyEvent>>,
    trace_files: HashMap<PaneId, std::fs::File>,
    started: Instant,
}

impl Hub {
    /// Create a hub with no panes or windows yet.
    #[must_use]
    pub fn new(config: ServerConfig, templates: HashMap<String, LayoutNode>) -> Self {
        let (pty_tx, pty_rx) = mpsc::unbounded_channel();
        Self {
            config,
            panes: HashMap::new(),
            next_pane_id: 1,
            windows: Vec::new(),
            next_window_id: 1,
            templates,
            registry: ClientRegistry::new(),
            pty_tx,
            pty_rx: Some(pty_rx),
            trace_files: HashMap::new(),
            started: Instant::now(),
        }
    }

    /// Extract the PTY event receiver for the run loop's `select!`.
    pub fn take_pty_rx(&mut self) -> Option<UnboundedReceiver<PtyEvent>> {
        self.pty_rx.take()
    }

    /// Create the debug pane and the initial window from the configured
    /// template, spawning one shell per slot.
    ///
    /// # Errors
    ///
    /// Returns an error when the template is unknown or any initial
    /// shell fails to spawn (fatal at startup).
    pub fn init_session(&mut self) -> Result<()> {
        let mut debug_pane = Pane::new(DEBUG_PANE, 80, 24, self.config.scrollback);
        debug_pane.set_delta_budget(self.config.delta_budget);
        self.panes.insert(DEBUG_PANE, debug_pane);
        self.debug_log(&format!("dullahan {} starting", env!("CARGO_PKG_VERSION")));

        let template = self
            .templates
            .get(&self.config.template)
            .with_context(|| format!("unknown layout template {:?}", self.config.template))?
            .clone();
        let mut pane_ids = Vec::with_capacity(template.slots());
        for _ in 0..template.slots() {
            pane_ids.push(self.spawn_shell_pane(80, 24)?);
        }
        let layout = template.instantiate(&pane_ids)?;
        let window = Window {
            id: self.next_window_id,
            title: None,
            layout,
        };
        self.next_window_id += 1;
        self.windows.push(window);
        Ok(())
    }

    /// Register a pane created outside the shell-spawn path (the debug
    /// pane and tests).
    pub fn insert_pane(&mut self, pane: Pane) {
        let id = pane.id();
        self.next_pane_id = self.next_pane_id.max(id.saturating_add(1));
        self.panes.insert(id, pane);
        self.registry.subscribe_all(id);
    }

    /// Spawn a shell in a fresh pane and announce it to clients.
    ///
    /// # Errors
    ///
    /// Returns an error when the PTY cannot be opened or the shell
    /// cannot be spawned.
    pub fn spawn_shell_pane(&mut self, cols: u16, rows: u16) -> Result<PaneId> {
        let id = self.next_pane_id;
        self.next_pane_id += 1;
        let mut pane = Pane::new(id, cols, rows, self.config.scrollback);
        pane.set_delta_budget(self.config.delta_budget);
        let pty = PtyProcess::spawn(&self.config.shell, cols, rows, id, self.pty_tx.clone())
            .with_context(|| format!("failed to spawn pane {id}"))?;
        pane.attach_pty(pty);
        self.panes.insert(id, pane);
        self.registry.subscribe_all(id);
        let dead = self.registry.broadcast(&encode::pane_added_frame(id, cols, rows));
        self.drop_clients(dead);
        Ok(id)
    }

    /// Look up a pane (tests and the admin surface).
    #[must_use]
    pub fn pane(&self, id: PaneId) -> Option<&Pane> {
        self.panes.get(&id)
    }

    /// Number of live panes, the debug pane included.
    #[must_use]
    pub fn pane_count(&self) -> usize {
        self.panes.len()
    }

    /// JSON description of the window/layout tree.
    ///
    /// Windows without an explicit title borrow the OSC title of their
    /// first titled pane.
    #[must_use]
    pub fn layout_json(&self) -> serde_json::Value {
        let windows: Vec<Window> = self
            .windows
            .iter()
            .map(|window| {
                let mut window = window.clone();
                if window.title.is_none() {
                    window.title = window.pane_ids().iter().find_map(|id| {
                        self.panes
                            .get(id)
                            .and_then(|p| p.title().map(str::to_string))
                    });
                }
                window
            })
            .collect();
        serde_json::to_value(&windows).expect("windows serialize")
    }

    // ── Event dispatch ────────────────────────────────────────────────────────

    /// Process one event. Returns `false` when the hub should shut down.
    pub fn handle_event(&mut self, event: HubEvent) -> bool {
        match event {
            HubEvent::ClientConnected { id, sender } => {
                self.registry.add(id, sender);
                for pane_id in self.panes.keys().copied().collect::<Vec<_>>() {
                    if let Some(client) = self.registry.get_mut(id) {
                        client.sub_mut(pane_id);
                    }
                }
                log::info!("client {id} connected ({} total)", self.registry.len());
                self.debug_log(&format!("client {id} connected"));
            }
            HubEvent::ClientMessage { id, text } => self.handle_client_text(id, &text),
            HubEvent::ClientGone { id } => self.drop_client(id),
            HubEvent::Pty(event) => self.handle_pty(event),
            HubEvent::Admin { request, reply } => {
                let quit = matches!(request, AdminRequest::Quit);
                let response = self.admin_response(request);
                let _ = reply.send(response);
                if quit {
                    log::info!("shutdown requested via admin socket");
                    return false;
                }
            }
            HubEvent::Shutdown => return false,
        }
        true
    }

    /// Apply PTY output or exit to the owning pane.
    pub fn handle_pty(&mut self, event: PtyEvent) {
        match event {
            PtyEvent::Output { pane, data } => {
                if self.config.pty_trace {
                    self.trace(pane, &data);
                }
                if let Some(p) = self.panes.get_mut(&pane) {
                    p.feed(&data);
                }
            }
            PtyEvent::Exited { pane } => self.handle_pane_exit(pane),
        }
    }

    fn handle_pane_exit(&mut self, pane_id: PaneId) {
        let Some(mut pane) = self.panes.remove(&pane_id) else {
            return;
        };
        let code = pane.reap();
        pane.shutdown();
        log::info!("pane {pane_id} exited (code {code:?})");
        self.trace_files.remove(&pane_id);
        self.registry.drop_pane(pane_id);
        self.windows.retain_mut(|window| {
            match window.layout.remove_pane(pane_id) {
                Some(layout) => {
                    window.layout = layout;
                    true
                }
                None => false,
            }
        });
        let dead = self.registry.broadcast(&encode::pane_closed_frame(pane_id));
        self.drop_clients(dead);
        self.broadcast_layout();
        self.debug_log(&format!("pane {pane_id} closed (exit {code:?})"));
    }

    /// Remove a client and vacate its masterships.
    pub fn drop_client(&mut self, id: ClientId) {
        let released = self.registry.remove(id);
        for pane in released {
            let dead = self
                .registry
                .broadcast(&encode::master_changed_frame(pane, None));
            self.drop_clients(dead);
        }
        log::info!("client {id} disconnected ({} remain)", self.registry.len());
        self.debug_log(&format!("client {id} disconnected"));
    }

    fn drop_clients(&mut self, ids: Vec<ClientId>) {
        for id in ids {
            self.drop_client(id);
        }
    }

    /// Broadcast the current layout to every client.
    pub fn broadcast_layout(&mut self) {
        match encode::layout_frame(&self.layout_json()) {
            Ok(frame) => {
                let dead = self.registry.broadcast(&frame);
                self.drop_clients(dead);
            }
            Err(e) => log::error!("layout frame encoding failed: {e}"),
        }
    }

    // ── Replication ───────────────────────────────────────────────────────────

    /// Push updates to every subscription that is behind and not already
    /// awaiting an ack.
    pub fn replicate(&mut self) {
        let mut dead = Vec::new();
        for client in self.registry.iter_mut() {
            let mut frames = Vec::new();
            for (pane_id, sub) in &mut client.subs {
                let Some(pane) = self.panes.get(pane_id) else {
                    continue;
                };
                if sub.in_flight {
                    continue;
                }
                let frame = match sub.state {
                    SubState::Priming | SubState::Resync => {
                        Some(encode::snapshot_frame(&pane.snapshot()))
                    }
                    SubState::Tracking => {
                        if pane.generation() <= sub.last_seen_gen {
                            None
                        } else {
                            match pane.delta_since(sub.last_seen_gen) {
                                Some(delta) => Some(encode::delta_frame(&delta)),
                                // Too stale for deltas: upgrade to snapshot.
                                None => Some(encode::snapshot_frame(&pane.snapshot())),
                            }
                        }
                    }
                };
                if let Some(bytes) = frame {
                    sub.in_flight = true;
                    frames.push(bytes);
                }
            }
            for bytes in frames {
                if !client.send(ClientCmd::Frame(bytes)) {
                    dead.push(client.id);
                    break;
                }
            }
        }
        self.drop_clients(dead);
    }

    // ── Admin surface ─────────────────────────────────────────────────────────

    fn pane_list_json(&self) -> serde_json::Value {
        let mut panes: Vec<&Pane> = self.panes.values().collect();
        panes.sort_by_key(|p| p.id());
        serde_json::Value::Array(
            panes
                .into_iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.id(),
                        "cols": p.cols(),
                        "rows": p.rows(),
                        "gen": p.generation(),
                        "title": p.title(),
                        "shell": p.has_pty(),
                    })
                })
                .collect(),
        )
    }

    /// Answer one admin command.
    #[must_use]
    pub fn admin_response(&mut self, request: AdminRequest) -> serde_json::Value {
        match request {
            AdminRequest::Ping => serde_json::json!({"ok": true, "pong": true}),
            AdminRequest::Status => serde_json::json!({
                "ok": true,
                "version": env!("CARGO_PKG_VERSION"),
                "uptimeSecs": self.started.elapsed().as_secs(),
                "clients": self.registry.len(),
                "panes": self.pane_list_json(),
            }),
            AdminRequest::Panes => serde_json::json!({
                "ok": true,
                "panes": self.pane_list_json(),
            }),
            AdminRequest::SendText { pane, text } => match self.panes.get_mut(&pane) {
                Some(p) => match p.write(text.as_bytes()) {
                    Ok(()) => serde_json::json!({"ok": true}),
                    Err(e) => serde_json::json!({"ok": false, "error": e.to_string()}),
                },
                None => serde_json::json!({"ok": false, "error": format!("no such pane: {pane}")}),
            },
            AdminRequest::Layout => serde_json::json!({
                "ok": true,
                "windows": self.layout_json(),
            }),
            AdminRequest::Quit => serde_json::json!({"ok": true}),
        }
    }

    // ── Debug pane and traces ─────────────────────────────────────────────────

    /// Append a server-side event line to the debug pane.
    ///
    /// The debug pane replicates like any other pane, so connected
    /// clients see these lines as ordinary terminal output.
    pub fn debug_log(&mut self, message: &str) {
        if let Some(pane) = self.panes.get_mut(&DEBUG_PANE) {
            pane.feed(format!("{message}\r\n").as_bytes());
        }
    }

    /// Append raw PTY output to the pane's trace file.
    fn trace(&mut self, pane: PaneId, data: &[u8]) {
        if !self.trace_files.contains_key(&pane) {
            let file = config::pty_trace_path(pane).and_then(|path| {
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("Failed to open PTY trace: {}", path.display()))
            });
            match file {
                Ok(file) => {
                    self.trace_files.insert(pane, file);
                }
                Err(e) => {
                    log::warn!("{e}");
                    return;
                }
            }
        }
        if let Some(file) = self.trace_files.get_mut(&pane) {
            if let Err(e) = file.write_all(data) {
                log::warn!("PTY trace write failed for pane {pane}: {e}");
                self.trace_files.remove(&pane);
            }
        }
    }

    /// Kill every pane's child and drop all state (graceful shutdown).
    pub fn shutdown(&mut self) {
        for (_, pane) in self.panes.iter_mut() {
            pane.shutdown();
        }
        self.panes.clear();
        log::info!("hub shut down");
    }
}
