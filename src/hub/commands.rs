//! Client message dispatch and the master filter.
//!
//! Every decoded [`ClientMessage`] passes through here. Mutating
//! messages (`key`, `text`, `resize`, `scroll`) are subject to master
//! arbitration: the first client to send one to an unmastered pane
//! claims master; anyone else's mutations are silently dropped, per the
//! replication contract. Read-only messages (`sync`, `resync`, `focus`,
//! `hello`, `ping`) are always accepted.

// Rust guideline compliant 2026-03

use crate::encode;
use crate::input;
use crate::pane::{PaneId, DEBUG_PANE};
use crate::protocol::ClientMessage;
use crate::registry::{ClientId, MasterDecision, SubState, Theme};
use crate::ws::ClientCmd;

use super::Hub;

impl Hub {
    /// Parse and dispatch one text frame from a client.
    ///
    /// A malformed payload is a protocol error: logged once and the
    /// client is closed.
    pub fn handle_client_text(&mut self, id: ClientId, text: &str) {
        match ClientMessage::parse(text) {
            Ok(message) => self.handle_client_message(id, message),
            Err(e) => {
                log::warn!("client {id}: protocol error, closing: {e:#}");
                if let Some(client) = self.registry.get(id) {
                    client.send(ClientCmd::Close);
                }
                self.drop_client(id);
            }
        }
    }

    /// Dispatch one decoded message.
    pub fn handle_client_message(&mut self, id: ClientId, message: ClientMessage) {
        if message.is_mutating() {
            let Some(pane_id) = message.pane_id() else {
                return;
            };
            // The debug pane accepts no input from anyone.
            if pane_id == DEBUG_PANE {
                return;
            }
            if self.pane(pane_id).is_none() {
                log::debug!("client {id}: message for unknown pane {pane_id}");
                return;
            }
            match self.registry.claim_master(pane_id, id) {
                MasterDecision::Denied => {
                    // Silently dropped; non-masters see state via sync.
                    return;
                }
                MasterDecision::Granted => self.announce_master(pane_id),
                MasterDecision::Retained => {}
            }
        }

        match message {
            ClientMessage::Key {
                pane_id,
                key,
                state,
                modifiers,
                ..
            } => {
                let app_cursor = self
                    .pane(pane_id)
                    .is_some_and(|p| p.grid().modes().app_cursor);
                if let Some(bytes) = input::encode_key(&key, state, modifiers, app_cursor) {
                    self.write_pane(pane_id, &bytes);
                }
            }
            ClientMessage::Text { pane_id, data } => {
                self.write_pane(pane_id, data.as_bytes());
            }
            ClientMessage::Resize {
                pane_id,
                cols,
                rows,
            } => {
                if let Some(pane) = self.pane_mut(pane_id) {
                    if let Err(e) = pane.resize(cols, rows) {
                        log::warn!("pane {pane_id} resize failed: {e:#}");
                    }
                }
            }
            ClientMessage::Scroll { pane_id, delta } => {
                if let Some(pane) = self.pane_mut(pane_id) {
                    pane.scroll(delta);
                }
            }
            ClientMessage::Sync {
                pane_id,
                gen,
                min_row_id,
            } => {
                if let Some(client) = self.registry.get_mut(id) {
                    let sub = client.sub_mut(pane_id);
                    let acked = sub.in_flight;
                    sub.in_flight = false;
                    sub.last_seen_gen = gen;
                    sub.min_cached_row_id = min_row_id;
                    // Priming/Resync complete only when the client acks a
                    // pushed update; a stray sync must not skip the snapshot.
                    if acked {
                        sub.state = SubState::Tracking;
                    }
                }
            }
            ClientMessage::Resync { pane_id } => {
                if let Some(client) = self.registry.get_mut(id) {
                    let sub = client.sub_mut(pane_id);
                    sub.state = SubState::Resync;
                    sub.in_flight = false;
                }
            }
            ClientMessage::Focus { pane_id } => {
                if let Some(client) = self.registry.get_mut(id) {
                    client.focus = Some(pane_id);
                }
            }
            ClientMessage::Hello {
                theme_name,
                theme_fg,
                theme_bg,
            } => {
                if let Some(client) = self.registry.get_mut(id) {
                    client.theme = Some(Theme {
                        name: theme_name,
                        fg: theme_fg,
                        bg: theme_bg,
                    });
                }
                // Structural state for the new renderer; snapshots follow
                // via the replication scan in whichever order wins.
                self.send_layout_to(id);
            }
            ClientMessage::Ping => {
                if let Some(client) = self.registry.get(id) {
                    client.send(ClientCmd::Frame(encode::pong_frame()));
                }
            }
        }
    }

    fn write_pane(&mut self, pane_id: PaneId, bytes: &[u8]) {
        if let Some(pane) = self.pane_mut(pane_id) {
            if let Err(e) = pane.write(bytes) {
                log::warn!("pane {pane_id} write failed: {e:#}");
            }
        }
    }

    fn pane_mut(&mut self, id: PaneId) -> Option<&mut crate::pane::Pane> {
        self.panes.get_mut(&id)
    }

    fn announce_master(&mut self, pane_id: PaneId) {
        let owner = self.registry.master_of(pane_id).map(|c| c.short());
        let frame = encode::master_changed_frame(pane_id, owner.as_deref());
        let dead = self.registry.broadcast(&frame);
        self.drop_clients_list(dead);
        if let Some(owner) = owner {
            self.debug_log(&format!("client {owner} is master of pane {pane_id}"));
        }
    }

    fn send_layout_to(&mut self, id: ClientId) {
        match encode::layout_frame(&self.layout_json()) {
            Ok(frame) => {
                if let Some(client) = self.registry.get(id) {
                    client.send(ClientCmd::Frame(frame));
                }
            }
            Err(e) => log::error!("layout frame encoding failed: {e}"),
        }
    }

    fn drop_clients_list(&mut self, ids: Vec<ClientId>) {
        for id in ids {
            self.drop_client(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::hub::events::HubEvent;
    use crate::layout::builtin_templates;
    use crate::pane::Pane;

    fn test_hub() -> Hub {
        let mut hub = Hub::new(
            ServerConfig::default(),
            builtin_templates().into_iter().collect(),
        );
        hub.insert_pane(Pane::new(DEBUG_PANE, 80, 24, 100));
        hub.insert_pane(Pane::new(1, 80, 24, 100));
        hub
    }

    fn connect(hub: &mut Hub) -> (ClientId, tokio::sync::mpsc::UnboundedReceiver<ClientCmd>) {
        let id = ClientId::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        hub.handle_event(HubEvent::ClientConnected { id, sender: tx });
        (id, rx)
    }

    #[test]
    fn first_key_claims_master_and_later_senders_are_filtered() {
        let mut hub = test_hub();
        let (a, _rx_a) = connect(&mut hub);
        let (b, _rx_b) = connect(&mut hub);

        hub.handle_client_text(
            a,
            r#"{"type":"resize","paneId":1,"cols":100,"rows":30}"#,
        );
        assert_eq!(hub.registry.master_of(1), Some(a));
        assert_eq!(hub.pane(1).expect("pane").cols(), 100);
        let gen_after_a = hub.pane(1).expect("pane").generation();

        // Non-master mutations change nothing, not even the generation.
        hub.handle_client_text(
            b,
            r#"{"type":"resize","paneId":1,"cols":50,"rows":10}"#,
        );
        hub.handle_client_text(b, r#"{"type":"scroll","paneId":1,"delta":3}"#);
        assert_eq!(hub.pane(1).expect("pane").generation(), gen_after_a);
        assert_eq!(hub.pane(1).expect("pane").cols(), 100);
    }

    #[test]
    fn master_cleared_on_disconnect_passes_to_next_sender() {
        let mut hub = test_hub();
        let (a, _rx_a) = connect(&mut hub);
        let (b, _rx_b) = connect(&mut hub);

        hub.handle_client_text(a, r#"{"type":"scroll","paneId":1,"delta":0}"#);
        assert_eq!(hub.registry.master_of(1), Some(a));

        hub.handle_event(HubEvent::ClientGone { id: a });
        assert_eq!(hub.registry.master_of(1), None);

        hub.handle_client_text(b, r#"{"type":"scroll","paneId":1,"delta":0}"#);
        assert_eq!(hub.registry.master_of(1), Some(b));
    }

    #[test]
    fn read_only_messages_bypass_master_filter() {
        let mut hub = test_hub();
        let (a, _rx_a) = connect(&mut hub);
        let (b, _rx_b) = connect(&mut hub);
        hub.handle_client_text(a, r#"{"type":"key","paneId":1,"key":"x","state":"down"}"#);

        // B never becomes master but its sync is accepted.
        hub.handle_client_text(b, r#"{"type":"sync","paneId":1,"gen":0,"minRowId":0}"#);
        let sub = &hub.registry.get(b).expect("client").subs[&1];
        assert_eq!(sub.last_seen_gen, 0);
        assert_eq!(hub.registry.master_of(1), Some(a));

        hub.handle_client_text(b, r#"{"type":"focus","paneId":1}"#);
        assert_eq!(hub.registry.get(b).expect("client").focus, Some(1));
    }

    #[test]
    fn debug_pane_input_dropped_before_arbitration() {
        let mut hub = test_hub();
        let (a, _rx) = connect(&mut hub);
        let gen = hub.pane(DEBUG_PANE).expect("pane").generation();
        hub.handle_client_text(a, r#"{"type":"key","paneId":0,"key":"x","state":"down"}"#);
        assert_eq!(hub.registry.master_of(DEBUG_PANE), None);
        assert_eq!(hub.pane(DEBUG_PANE).expect("pane").generation(), gen);
    }

    #[test]
    fn malformed_message_closes_client() {
        let mut hub = test_hub();
        let (a, _rx) = connect(&mut hub);
        assert_eq!(hub.registry.len(), 1);
        hub.handle_client_text(a, "{nonsense");
        assert_eq!(hub.registry.len(), 0);
    }

    #[test]
    fn resync_forces_snapshot_with_current_generation() {
        let mut hub = test_hub();
        let (a, mut rx) = connect(&mut hub);

        // Prime and ack so the client is Tracking.
        hub.replicate();
        while let Ok(cmd) = rx.try_recv() {
            drop(cmd);
        }
        hub.handle_client_text(a, r#"{"type":"sync","paneId":1,"gen":0,"minRowId":0}"#);

        // Make some progress, then declare cache loss.
        if let Some(pane) = hub.pane_mut(1) {
            pane.feed(b"output");
        }
        let gen_at_resync = hub.pane(1).expect("pane").generation();
        hub.handle_client_text(a, r#"{"type":"resync","paneId":1}"#);
        hub.replicate();

        let mut snapshot_gen = None;
        while let Ok(cmd) = rx.try_recv() {
            if let ClientCmd::Frame(bytes) = cmd {
                let value = crate::wire::Value::decode(&bytes).expect("frame");
                if value.get("type").and_then(|v| v.as_str()) == Some("snapshot")
                    && value.get("paneId").and_then(crate::wire::Value::as_u64) == Some(1)
                {
                    snapshot_gen = value.get("gen").and_then(crate::wire::Value::as_u64);
                }
            }
        }
        let snapshot_gen = snapshot_gen.expect("snapshot pushed after resync");
        assert!(snapshot_gen >= gen_at_resync);
    }

    #[test]
    fn stray_sync_does_not_skip_priming_snapshot() {
        let mut hub = test_hub();
        let (a, mut rx) = connect(&mut hub);
        // Sync before anything was pushed: stays Priming.
        hub.handle_client_text(a, r#"{"type":"sync","paneId":1,"gen":0,"minRowId":0}"#);
        assert_eq!(
            hub.registry.get(a).expect("client").subs[&1].state,
            SubState::Priming
        );
        hub.replicate();
        let mut saw_snapshot = false;
        while let Ok(cmd) = rx.try_recv() {
            if let ClientCmd::Frame(bytes) = cmd {
                let value = crate::wire::Value::decode(&bytes).expect("frame");
                if value.get("type").and_then(|v| v.as_str()) == Some("snapshot") {
                    saw_snapshot = true;
                }
            }
        }
        assert!(saw_snapshot);
    }

    #[test]
    fn hello_stores_theme_and_sends_layout() {
        let mut hub = test_hub();
        let (a, mut rx) = connect(&mut hub);
        hub.handle_client_text(
            a,
            r##"{"type":"hello","themeName":"nord","themeFg":"#d8dee9","themeBg":"#2e3440"}"##,
        );
        let theme = hub
            .registry
            .get(a)
            .and_then(|c| c.theme.clone())
            .expect("theme");
        assert_eq!(theme.name.as_deref(), Some("nord"));

        let mut saw_layout = false;
        while let Ok(cmd) = rx.try_recv() {
            if let ClientCmd::Frame(bytes) = cmd {
                let value = crate::wire::Value::decode(&bytes).expect("frame");
                if value.get("type").and_then(|v| v.as_str()) == Some("layout") {
                    saw_layout = true;
                }
            }
        }
        assert!(saw_layout);
    }

    #[test]
    fn ping_answered_with_pong_frame() {
        let mut hub = test_hub();
        let (a, mut rx) = connect(&mut hub);
        hub.handle_client_text(a, r#"{"type":"ping"}"#);
        let mut saw_pong = false;
        while let Ok(cmd) = rx.try_recv() {
            if let ClientCmd::Frame(bytes) = cmd {
                let value = crate::wire::Value::decode(&bytes).expect("frame");
                if value.get("type").and_then(|v| v.as_str()) == Some("pong") {
                    saw_pong = true;
                }
            }
        }
        assert!(saw_pong);
    }
}
