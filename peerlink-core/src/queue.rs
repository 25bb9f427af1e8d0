//! Received-packet FIFO shared between the native callback thread and the poll thread.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::channel::Channel;
use crate::identity::PeerId;

/// A full payload received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub source: PeerId,
    pub payload: Vec<u8>,
    pub channel: Channel,
}

impl DataPacket {
    pub fn new(source: PeerId, payload: Vec<u8>, channel: Channel) -> Self {
        Self {
            source,
            payload,
            channel,
        }
    }
}

/// Unbounded strict-FIFO queue. No priority between channels.
/// The lock is held only for a single push or pop.
#[derive(Debug, Default)]
pub struct PacketQueue {
    inner: Mutex<VecDeque<DataPacket>>,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append; never fails and never drops.
    pub fn enqueue(&self, packet: DataPacket) {
        self.inner.lock().push_back(packet);
    }

    /// Remove and return the oldest packet, or None when empty.
    pub fn try_dequeue(&self) -> Option<DataPacket> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
