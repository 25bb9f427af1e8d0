//! Peer-to-peer transport adapter.
//! The native session pushes events on its own threads; the consumer pulls one event per poll.

pub mod adapter;
pub mod bridge;
pub mod channel;
pub mod config;
pub mod error;
pub mod identity;
pub mod loopback;
pub mod queue;
pub mod signal;

pub mod ffi;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use adapter::{AdapterState, NetworkEvent, Role, SessionState, TransportAdapter};
pub use bridge::{InboundHandle, NativeBridge};
pub use channel::{Channel, SendMode};
pub use config::TransportConfig;
pub use error::TransportError;
pub use identity::{ClientIdAllocator, PeerId, MAX_CLIENT_ID, MIN_CLIENT_ID};
pub use loopback::{LoopbackBridge, LoopbackHub};
pub use queue::{DataPacket, PacketQueue};
pub use signal::{ConnectionSignal, Latch};
