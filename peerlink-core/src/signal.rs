//! One-shot connection latches set by the native session and consumed by the next poll.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::identity::PeerId;

/// Single-slot latch holding a peer id. 0 means empty, so the flag and its
/// payload are the same word and cannot be observed out of step.
/// Last write wins; this is not a queue.
#[derive(Debug, Default)]
pub struct Latch {
    slot: AtomicU64,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the latch with `peer`, replacing any unconsumed value.
    /// Returns false (and leaves the latch untouched) for `PeerId::NONE`.
    pub fn signal(&self, peer: PeerId) -> bool {
        if peer.is_none() {
            return false;
        }
        self.slot.store(peer.get(), Ordering::Release);
        true
    }

    /// Read and clear in one step.
    pub fn consume(&self) -> Option<PeerId> {
        match self.slot.swap(0, Ordering::AcqRel) {
            0 => None,
            id => Some(PeerId(id)),
        }
    }

    /// Read without clearing.
    pub fn peek(&self) -> Option<PeerId> {
        match self.slot.load(Ordering::Acquire) {
            0 => None,
            id => Some(PeerId(id)),
        }
    }
}

/// Connect latch (client side: the server accepted us) and disconnect latch
/// (server side: a peer left the session).
#[derive(Debug, Default)]
pub struct ConnectionSignal {
    connect: Latch,
    disconnect: Latch,
}

impl ConnectionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal_connect(&self, server_id: PeerId) {
        if !self.connect.signal(server_id) {
            tracing::warn!("ignoring connection-accepted signal with reserved peer id 0");
        }
    }

    pub fn consume_connect(&self) -> Option<PeerId> {
        self.connect.consume()
    }

    pub fn peek_connect(&self) -> Option<PeerId> {
        self.connect.peek()
    }

    pub fn signal_disconnect(&self, peer_id: PeerId) {
        if !self.disconnect.signal(peer_id) {
            tracing::warn!("ignoring peer-disconnected signal with reserved peer id 0");
        }
    }

    pub fn consume_disconnect(&self) -> Option<PeerId> {
        self.disconnect.consume()
    }

    pub fn peek_disconnect(&self) -> Option<PeerId> {
        self.disconnect.peek()
    }
}
