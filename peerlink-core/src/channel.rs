//! Logical message channels and the send mode each one maps to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Channel tag attached to every payload. Forwarded verbatim; the adapter never routes on it.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(pub i32);

impl Channel {
    pub const INTERNAL: Channel = Channel(0);
    pub const TIME_SYNC: Channel = Channel(1);
    pub const RELIABLE_RPC: Channel = Channel(2);
    pub const UNRELIABLE_RPC: Channel = Channel(3);
    pub const SYNC_CHANNEL: Channel = Channel(4);
    pub const DEFAULT_MESSAGE: Channel = Channel(5);
    pub const POSITION_UPDATE: Channel = Channel(6);
    pub const ANIMATION: Channel = Channel(7);
    pub const NAV_AGENT_STATE: Channel = Channel(8);
    pub const NAV_AGENT_CORRECTION: Channel = Channel(9);
    /// Placeholder for events that carry no channel (Idle). Never a send target.
    pub const UNUSED: Channel = Channel(255);

    pub fn get(self) -> i32 {
        self.0
    }

    /// How a native session should deliver traffic on this channel.
    /// Unknown tags are sent reliably.
    pub fn send_mode(self) -> SendMode {
        match self {
            Channel::TIME_SYNC
            | Channel::UNRELIABLE_RPC
            | Channel::SYNC_CHANNEL
            | Channel::POSITION_UPDATE
            | Channel::ANIMATION
            | Channel::NAV_AGENT_STATE => SendMode::Unreliable,
            _ => SendMode::Reliable,
        }
    }
}

impl From<i32> for Channel {
    fn from(tag: i32) -> Self {
        Channel(tag)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery mode of the underlying session.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum SendMode {
    Reliable,
    Unreliable,
}
