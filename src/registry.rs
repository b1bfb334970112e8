//! Client registry, per-pane subscriptions, and master arbitration.
//!
//! The registry tracks every connected renderer, its replication state
//! per pane, and which client currently holds master on which pane. The
//! hub consults it on every message: mutating messages from a non-master
//! are silently dropped, and the first mutating sender to an unmastered
//! pane claims it.
//!
//! # Subscription state machine
//!
//! ```text
//! Priming ──sync──▶ Tracking ──resync──▶ Resync ──snapshot+sync──▶ Tracking
//! ```
//!
//! `in_flight` is the implicit ack: set when an update is pushed,
//! cleared by the client's next `sync`. The replication scan skips
//! subscriptions with an update in flight so a slow client is never
//! flooded.

// Rust guideline compliant 2026-03

use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::grid::RowId;
use crate::pane::PaneId;
use crate::ws::ClientCmd;

/// Unique identifier for a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short prefix for logs and the `master-changed` frame.
    #[must_use]
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Replication state of one client for one pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubState {
    /// Awaiting the first snapshot ack (implicit in the next sync).
    Priming,
    /// Delta-capable.
    Tracking,
    /// Client declared cache loss; the next update must be a snapshot.
    Resync,
}

/// Per-pane subscription record.
#[derive(Debug)]
pub struct Subscription {
    /// State machine position.
    pub state: SubState,
    /// Last generation the client acknowledged via `sync`.
    pub last_seen_gen: u64,
    /// Oldest row id the client claims to have cached.
    pub min_cached_row_id: RowId,
    /// An update was pushed and not yet acknowledged.
    pub in_flight: bool,
}

impl Subscription {
    /// Fresh subscription awaiting its priming snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SubState::Priming,
            last_seen_gen: 0,
            min_cached_row_id: 0,
            in_flight: false,
        }
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

/// Theme details from the client's `hello`.
#[derive(Debug, Clone, Default)]
pub struct Theme {
    /// Theme name.
    pub name: Option<String>,
    /// Preferred foreground color.
    pub fg: Option<String>,
    /// Preferred background color.
    pub bg: Option<String>,
}

/// One connected renderer.
#[derive(Debug)]
pub struct Client {
    /// Client id.
    pub id: ClientId,
    sender: UnboundedSender<ClientCmd>,
    /// Per-pane replication state.
    pub subs: HashMap<PaneId, Subscription>,
    /// Whether this client may hold master on panes.
    pub master_capable: bool,
    /// Currently viewed pane.
    pub focus: Option<PaneId>,
    /// Theme from `hello`, if received.
    pub theme: Option<Theme>,
}

impl Client {
    /// Deliver a command to the client's writer task.
    ///
    /// Returns `false` when the writer is gone (client disconnecting).
    pub fn send(&self, cmd: ClientCmd) -> bool {
        self.sender.send(cmd).is_ok()
    }

    /// Subscription for `pane`, creating it in Priming state if absent.
    pub fn sub_mut(&mut self, pane: PaneId) -> &mut Subscription {
        self.subs.entry(pane).or_default()
    }
}

/// Outcome of a master claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterDecision {
    /// The claimant already held master.
    Retained,
    /// The pane was unmastered; the claimant now holds it.
    Granted,
    /// Another client holds master; the message must be dropped.
    Denied,
}

/// All connected clients plus the per-pane master map.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, Client>,
    masters: HashMap<PaneId, ClientId>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly connected client.
    pub fn add(&mut self, id: ClientId, sender: UnboundedSender<ClientCmd>) {
        self.clients.insert(
            id,
            Client {
                id,
                sender,
                subs: HashMap::new(),
                master_capable: true,
                focus: None,
                theme: None,
            },
        );
    }

    /// Remove a client, releasing its masterships.
    ///
    /// Returns the panes whose master was cleared so the hub can
    /// broadcast the change.
    pub fn remove(&mut self, id: ClientId) -> Vec<PaneId> {
        self.clients.remove(&id);
        let released: Vec<PaneId> = self
            .masters
            .iter()
            .filter(|(_, owner)| **owner == id)
            .map(|(pane, _)| *pane)
            .collect();
        for pane in &released {
            self.masters.remove(pane);
        }
        released
    }

    /// Look up a client.
    #[must_use]
    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// Look up a client mutably.
    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    /// Number of connected clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Iterate clients mutably (replication scan).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Client> {
        self.clients.values_mut()
    }

    /// Subscribe every connected client to a new pane.
    pub fn subscribe_all(&mut self, pane: PaneId) {
        for client in self.clients.values_mut() {
            client.subs.entry(pane).or_default();
        }
    }

    /// Drop a closed pane from every subscription and the master map.
    pub fn drop_pane(&mut self, pane: PaneId) {
        for client in self.clients.values_mut() {
            client.subs.remove(&pane);
        }
        self.masters.remove(&pane);
    }

    /// Current master of a pane.
    #[must_use]
    pub fn master_of(&self, pane: PaneId) -> Option<ClientId> {
        self.masters.get(&pane).copied()
    }

    /// Arbitrate a mutating message: grant master if the pane is free.
    pub fn claim_master(&mut self, pane: PaneId, claimant: ClientId) -> MasterDecision {
        match self.masters.get(&pane) {
            Some(owner) if *owner == claimant => MasterDecision::Retained,
            Some(_) => MasterDecision::Denied,
            None => {
                let capable = self
                    .clients
                    .get(&claimant)
                    .is_some_and(|c| c.master_capable);
                if capable {
                    self.masters.insert(pane, claimant);
                    MasterDecision::Granted
                } else {
                    MasterDecision::Denied
                }
            }
        }
    }

    /// Release master if held by `owner`. Returns true when released.
    pub fn release_master(&mut self, pane: PaneId, owner: ClientId) -> bool {
        if self.masters.get(&pane) == Some(&owner) {
            self.masters.remove(&pane);
            true
        } else {
            false
        }
    }

    /// Send an encoded frame to every client.
    ///
    /// Returns ids whose writer is gone; the hub removes them after the
    /// iteration so membership changes never happen mid-broadcast.
    pub fn broadcast(&self, frame: &[u8]) -> Vec<ClientId> {
        let mut dead = Vec::new();
        for client in self.clients.values() {
            if !client.send(ClientCmd::Frame(frame.to_vec())) {
                dead.push(client.id);
            }
        }
        dead
    }
}
