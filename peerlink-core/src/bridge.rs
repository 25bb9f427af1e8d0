//! Boundary with the native connectivity layer (discovery, session, raw byte delivery).
//!
//! Outbound, the adapter drives a [`NativeBridge`]. Inbound, the bridge reports
//! session events through the [`InboundHandle`] it was given at `init`. The
//! handle only ever enqueues or raises a latch, so it is safe to call from any
//! thread at any time, including concurrently with itself.

use std::sync::Arc;

use crate::channel::Channel;
use crate::identity::PeerId;
use crate::queue::{DataPacket, PacketQueue};
use crate::signal::ConnectionSignal;

/// The native session primitive. Every call is a fire-and-forget request;
/// results come back later through the [`InboundHandle`].
pub trait NativeBridge: Send + Sync {
    /// Set up the session for `service_type`, advertising `local_id` as this
    /// peer's display name. `inbound` receives every callback for this session.
    fn init(&self, service_type: &str, local_id: &str, inbound: InboundHandle);

    /// Server side: look for advertising peers and invite them.
    fn start_browsing(&self);

    /// Client side: make this peer discoverable.
    fn start_advertising(&self);

    /// Best-effort send. `payload` is already an owned copy.
    fn send_data(&self, peer: PeerId, payload: Vec<u8>, channel: Channel);

    /// The session only offers an all-peers disconnect.
    fn disconnect_all_peers(&self);
}

/// State written by the native callback context and drained by the poll context.
#[derive(Debug, Default)]
pub(crate) struct Inbound {
    pub(crate) queue: PacketQueue,
    pub(crate) signal: ConnectionSignal,
}

/// Callback sink handed to the bridge. Cheap to clone; all clones feed the same adapter.
#[derive(Debug, Clone)]
pub struct InboundHandle {
    inner: Arc<Inbound>,
}

impl InboundHandle {
    pub(crate) fn new(inner: Arc<Inbound>) -> Self {
        Self { inner }
    }

    /// Client side: the server accepted this peer into its session.
    pub fn on_connection_accepted(&self, server_id: PeerId) {
        tracing::debug!(%server_id, "connection accepted");
        self.inner.signal.signal_connect(server_id);
    }

    /// A peer left the session.
    pub fn on_peer_disconnected(&self, peer_id: PeerId) {
        tracing::debug!(%peer_id, "peer disconnected");
        self.inner.signal.signal_disconnect(peer_id);
    }

    /// A full payload arrived from `peer_id`. Borrowed payloads are copied before returning.
    pub fn on_data_received(&self, peer_id: PeerId, payload: impl Into<Vec<u8>>, channel: Channel) {
        let payload = payload.into();
        tracing::trace!(%peer_id, %channel, len = payload.len(), "data received");
        self.inner
            .queue
            .enqueue(DataPacket::new(peer_id, payload, channel));
    }

    /// Packets received and not yet polled.
    pub fn pending_packets(&self) -> usize {
        self.inner.queue.len()
    }
}
