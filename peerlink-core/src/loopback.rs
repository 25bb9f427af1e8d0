//! In-process [`NativeBridge`]: adapters sharing a [`LoopbackHub`] discover and
//! connect to each other the way devices on the same radio session would.
//!
//! Browsers (servers) link with advertisers (clients) of the same service type.
//! Callbacks are invoked on the calling thread after the hub lock is released.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bridge::{InboundHandle, NativeBridge};
use crate::channel::Channel;
use crate::identity::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Browsing,
    Advertising,
}

struct Node {
    service_type: String,
    inbound: InboundHandle,
    mode: Mode,
    links: HashSet<PeerId>,
}

#[derive(Default)]
struct HubState {
    nodes: HashMap<PeerId, Node>,
}

/// A callback to run once the hub lock is dropped.
enum Delivery {
    Accepted(InboundHandle, PeerId),
    Disconnected(InboundHandle, PeerId),
    Data(InboundHandle, PeerId, Vec<u8>, Channel),
}

impl Delivery {
    fn run(self) {
        match self {
            Delivery::Accepted(to, server) => to.on_connection_accepted(server),
            Delivery::Disconnected(to, peer) => to.on_peer_disconnected(peer),
            Delivery::Data(to, from, payload, channel) => to.on_data_received(from, payload, channel),
        }
    }
}

/// Shared medium for loopback bridges. Clones refer to the same hub.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bridge attached to this hub. One per adapter.
    pub fn bridge(&self) -> LoopbackBridge {
        LoopbackBridge {
            hub: self.clone(),
            local_id: Mutex::new(None),
        }
    }

    /// Peers currently linked to `id`, sorted.
    pub fn links(&self, id: PeerId) -> Vec<PeerId> {
        let state = self.state.lock();
        let mut out: Vec<PeerId> = state
            .nodes
            .get(&id)
            .map(|n| n.links.iter().copied().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Simulate `id` vanishing from the session (out of range, app killed).
    /// Every linked peer is told it disconnected; `id` itself is not notified.
    pub fn drop_node(&self, id: PeerId) {
        let deliveries = {
            let mut state = self.state.lock();
            let Some(node) = state.nodes.remove(&id) else {
                return;
            };
            let mut out = Vec::new();
            for peer in node.links {
                if let Some(other) = state.nodes.get_mut(&peer) {
                    other.links.remove(&id);
                    out.push(Delivery::Disconnected(other.inbound.clone(), id));
                }
            }
            out
        };
        tracing::debug!(peer = %id, notified = deliveries.len(), "loopback node dropped");
        deliveries.into_iter().for_each(Delivery::run);
    }

    /// Returns false if `id` is already on the hub; the existing node keeps its session.
    fn register(&self, id: PeerId, service_type: &str, inbound: InboundHandle) -> bool {
        let mut state = self.state.lock();
        if state.nodes.contains_key(&id) {
            tracing::warn!(peer = %id, "peer id already on the loopback hub; refusing duplicate registration");
            return false;
        }
        state.nodes.insert(
            id,
            Node {
                service_type: service_type.to_string(),
                inbound,
                mode: Mode::Idle,
                links: HashSet::new(),
            },
        );
        true
    }

    fn set_mode(&self, id: PeerId, mode: Mode) {
        let deliveries = {
            let mut state = self.state.lock();
            let Some(node) = state.nodes.get_mut(&id) else {
                tracing::warn!(peer = %id, "loopback bridge used before init");
                return;
            };
            node.mode = mode;
            let service_type = node.service_type.clone();

            let wanted = match mode {
                Mode::Browsing => Mode::Advertising,
                Mode::Advertising => Mode::Browsing,
                Mode::Idle => return,
            };
            let mut candidates: Vec<PeerId> = state
                .nodes
                .iter()
                .filter(|(other, n)| {
                    **other != id
                        && n.mode == wanted
                        && n.service_type == service_type
                        && (wanted == Mode::Browsing || n.links.is_empty())
                })
                .map(|(other, _)| *other)
                .collect();
            candidates.sort();
            if mode == Mode::Advertising {
                // an advertiser joins at most one browser's session
                candidates.truncate(1);
            }

            let mut out = Vec::new();
            for other in candidates {
                let (server, client) = match mode {
                    Mode::Browsing => (id, other),
                    _ => (other, id),
                };
                link(&mut state, server, client);
                if let Some(c) = state.nodes.get(&client) {
                    out.push(Delivery::Accepted(c.inbound.clone(), server));
                }
            }
            out
        };
        deliveries.into_iter().for_each(Delivery::run);
    }

    fn send(&self, from: PeerId, to: PeerId, payload: Vec<u8>, channel: Channel) {
        let delivery = {
            let state = self.state.lock();
            let linked = state
                .nodes
                .get(&from)
                .map(|n| n.links.contains(&to))
                .unwrap_or(false);
            match state.nodes.get(&to) {
                Some(n) if linked => Some(Delivery::Data(n.inbound.clone(), from, payload, channel)),
                _ => None,
            }
        };
        match delivery {
            Some(d) => d.run(),
            None => tracing::debug!(%from, %to, %channel, "no session with peer; dropping payload"),
        }
    }

    fn disconnect_all(&self, id: PeerId) {
        let deliveries = {
            let mut state = self.state.lock();
            let Some(node) = state.nodes.get_mut(&id) else {
                return;
            };
            let peers: Vec<PeerId> = node.links.drain().collect();
            let own_inbound = node.inbound.clone();
            let mut out = Vec::new();
            for peer in peers {
                if let Some(other) = state.nodes.get_mut(&peer) {
                    other.links.remove(&id);
                    out.push(Delivery::Disconnected(other.inbound.clone(), id));
                }
                out.push(Delivery::Disconnected(own_inbound.clone(), peer));
            }
            out
        };
        deliveries.into_iter().for_each(Delivery::run);
    }
}

fn link(state: &mut HubState, server: PeerId, client: PeerId) {
    if let Some(n) = state.nodes.get_mut(&server) {
        n.links.insert(client);
    }
    if let Some(n) = state.nodes.get_mut(&client) {
        n.links.insert(server);
    }
}

/// [`NativeBridge`] backed by a [`LoopbackHub`].
pub struct LoopbackBridge {
    hub: LoopbackHub,
    local_id: Mutex<Option<PeerId>>,
}

impl LoopbackBridge {
    fn id(&self) -> Option<PeerId> {
        *self.local_id.lock()
    }
}

impl NativeBridge for LoopbackBridge {
    fn init(&self, service_type: &str, local_id: &str, inbound: InboundHandle) {
        let id = match local_id.parse::<PeerId>() {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(local_id, error = %e, "loopback bridge needs a numeric peer id");
                return;
            }
        };
        // a colliding bridge stays detached so it cannot act on the other node's links
        if self.hub.register(id, service_type, inbound) {
            *self.local_id.lock() = Some(id);
        }
    }

    fn start_browsing(&self) {
        if let Some(id) = self.id() {
            self.hub.set_mode(id, Mode::Browsing);
        }
    }

    fn start_advertising(&self) {
        if let Some(id) = self.id() {
            self.hub.set_mode(id, Mode::Advertising);
        }
    }

    fn send_data(&self, peer: PeerId, payload: Vec<u8>, channel: Channel) {
        if let Some(id) = self.id() {
            self.hub.send(id, peer, payload, channel);
        }
    }

    fn disconnect_all_peers(&self) {
        if let Some(id) = self.id() {
            self.hub.disconnect_all(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{NetworkEvent, TransportAdapter};
    use crate::config::TransportConfig;

    fn adapter(hub: &LoopbackHub, service_type: &str, seed: u64) -> TransportAdapter<LoopbackBridge> {
        let config = TransportConfig {
            service_type: service_type.to_string(),
            id_seed: Some(seed),
        };
        let mut a = TransportAdapter::new(config, hub.bridge());
        a.init();
        a
    }

    #[test]
    fn browser_links_existing_advertisers() {
        let hub = LoopbackHub::new();
        let mut c1 = adapter(&hub, "ar-collab", 1);
        let mut c2 = adapter(&hub, "ar-collab", 2);
        c1.start_client().unwrap();
        c2.start_client().unwrap();
        let mut s = adapter(&hub, "ar-collab", 3);
        s.start_server().unwrap();

        let mut expected = vec![c1.local_id(), c2.local_id()];
        expected.sort();
        assert_eq!(hub.links(s.local_id()), expected);
        assert!(matches!(c1.poll_event(), NetworkEvent::Connect { peer, .. } if peer == s.local_id()));
        assert!(matches!(c2.poll_event(), NetworkEvent::Connect { peer, .. } if peer == s.local_id()));
    }

    #[test]
    fn service_types_do_not_mix() {
        let hub = LoopbackHub::new();
        let mut s = adapter(&hub, "ar-collab", 1);
        s.start_server().unwrap();
        let mut c = adapter(&hub, "other-game", 2);
        c.start_client().unwrap();
        assert!(hub.links(s.local_id()).is_empty());
        assert!(c.poll_event().is_idle());
    }

    #[test]
    fn unlinked_send_is_dropped() {
        let hub = LoopbackHub::new();
        let s = adapter(&hub, "ar-collab", 1);
        let mut c = adapter(&hub, "ar-collab", 2);
        s.send(c.local_id(), b"lost", Channel(0));
        assert!(c.poll_event().is_idle());
    }

    #[test]
    fn disconnect_all_notifies_both_sides() {
        let hub = LoopbackHub::new();
        let mut s = adapter(&hub, "ar-collab", 1);
        s.start_server().unwrap();
        let mut c = adapter(&hub, "ar-collab", 2);
        c.start_client().unwrap();
        assert!(matches!(c.poll_event(), NetworkEvent::Connect { .. }));

        s.disconnect_remote_client(c.local_id()).unwrap();
        assert!(hub.links(s.local_id()).is_empty());
        assert!(hub.links(c.local_id()).is_empty());
        assert!(matches!(
            s.poll_event(),
            NetworkEvent::Disconnect { peer, .. } if peer == c.local_id()
        ));
        assert_eq!(c.session().pending_disconnect, Some(s.local_id()));
    }

    #[test]
    fn colliding_id_does_not_hijack_live_session() {
        let hub = LoopbackHub::new();
        let mut s = adapter(&hub, "ar-collab", 1);
        s.start_server().unwrap();
        let mut c1 = adapter(&hub, "ar-collab", 2);
        c1.start_client().unwrap();
        assert!(matches!(c1.poll_event(), NetworkEvent::Connect { .. }));

        // same seed, same id
        let mut twin = adapter(&hub, "ar-collab", 2);
        assert_eq!(twin.local_id(), c1.local_id());
        assert_eq!(hub.node_count(), 2);
        twin.start_client().unwrap();
        twin.send(s.local_id(), b"ghost", Channel(0));
        assert!(twin.poll_event().is_idle());

        c1.send(s.local_id(), b"still here", Channel(0));
        match s.poll_event() {
            NetworkEvent::Data { peer, payload, .. } => {
                assert_eq!(peer, c1.local_id());
                assert_eq!(payload, b"still here");
            }
            other => panic!("expected Data, got {other:?}"),
        }
        assert!(s.poll_event().is_idle());
        assert_eq!(hub.links(s.local_id()), vec![c1.local_id()]);
    }

    #[test]
    fn dropped_node_is_reported_to_server() {
        let hub = LoopbackHub::new();
        let mut s = adapter(&hub, "ar-collab", 1);
        s.start_server().unwrap();
        let mut c = adapter(&hub, "ar-collab", 2);
        c.start_client().unwrap();
        hub.drop_node(c.local_id());
        assert_eq!(hub.node_count(), 1);
        assert!(matches!(
            s.poll_event(),
            NetworkEvent::Disconnect { peer, .. } if peer == c.local_id()
        ));
    }
}
