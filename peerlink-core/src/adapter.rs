//! Poll-based transport adapter: the consumer pulls one network event per call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::bridge::{Inbound, InboundHandle, NativeBridge};
use crate::channel::Channel;
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::identity::{ClientIdAllocator, PeerId};

/// Session role, fixed once a session is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Server,
    Client,
}

/// Adapter lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    Initialized,
    /// Server requested browsing.
    Serving,
    /// Client advertising, not yet accepted by a server.
    Connecting,
    Active,
    /// Shutdown requested. Teardown is not implemented, so this never reaches Closed.
    ShuttingDown,
    Closed,
}

/// One event handed to the consumer per poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Connect {
        peer: PeerId,
        channel: Channel,
        receive_time: Duration,
    },
    Disconnect {
        peer: PeerId,
        channel: Channel,
        receive_time: Duration,
    },
    Data {
        peer: PeerId,
        payload: Vec<u8>,
        channel: Channel,
        receive_time: Duration,
    },
    Idle,
}

impl NetworkEvent {
    pub fn is_idle(&self) -> bool {
        matches!(self, NetworkEvent::Idle)
    }

    /// Peer the event refers to; `PeerId::NONE` for Idle.
    pub fn peer(&self) -> PeerId {
        match self {
            NetworkEvent::Connect { peer, .. }
            | NetworkEvent::Disconnect { peer, .. }
            | NetworkEvent::Data { peer, .. } => *peer,
            NetworkEvent::Idle => PeerId::NONE,
        }
    }
}

/// Snapshot of the session fields and pending one-shot signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub local_id: PeerId,
    pub server_id: PeerId,
    pub role: Option<Role>,
    pub pending_connect: bool,
    pub pending_disconnect: Option<PeerId>,
}

/// Bridges a callback-driven [`NativeBridge`] to a pull-based event interface.
///
/// The native side only ever enqueues packets or raises latches through the
/// [`InboundHandle`]; the owner of the adapter drains them with
/// [`poll_event`](Self::poll_event). One adapter per process is expected; the
/// handle passed to the bridge at `init` is what ties callbacks to this instance.
pub struct TransportAdapter<B: NativeBridge> {
    config: TransportConfig,
    bridge: B,
    inbound: Arc<Inbound>,
    state: AdapterState,
    local_id: PeerId,
    server_id: PeerId,
    role: Option<Role>,
    epoch: Instant,
}

impl<B: NativeBridge> TransportAdapter<B> {
    pub fn new(config: TransportConfig, bridge: B) -> Self {
        Self {
            config,
            bridge,
            inbound: Arc::new(Inbound::default()),
            state: AdapterState::Uninitialized,
            local_id: PeerId::NONE,
            server_id: PeerId::NONE,
            role: None,
            epoch: Instant::now(),
        }
    }

    /// Allocate the local id and initialize the native session.
    ///
    /// An invalid service type is logged and the call does nothing else; the
    /// adapter stays `Uninitialized`. Calling again after success is ignored.
    pub fn init(&mut self) {
        if self.state != AdapterState::Uninitialized {
            tracing::warn!(local_id = %self.local_id, state = ?self.state, "init called twice; keeping existing identity");
            return;
        }
        if let Err(e) = self.config.validate() {
            tracing::error!(error = %e, "failed to init peer session");
            return;
        }
        let mut allocator = match self.config.id_seed {
            Some(seed) => ClientIdAllocator::with_seed(seed),
            None => ClientIdAllocator::from_clock(),
        };
        self.local_id = allocator.allocate();
        self.bridge.init(
            &self.config.service_type,
            &self.local_id.to_string(),
            self.inbound(),
        );
        self.state = AdapterState::Initialized;
        tracing::info!(local_id = %self.local_id, service_type = %self.config.service_type, "transport initialized");
    }

    /// Become the session server and start browsing for peers. Returns immediately.
    pub fn start_server(&mut self) -> Result<(), TransportError> {
        self.check_startable()?;
        self.role = Some(Role::Server);
        self.server_id = self.local_id;
        self.state = AdapterState::Serving;
        self.bridge.start_browsing();
        self.state = AdapterState::Active;
        tracing::info!(server_id = %self.server_id, "started server");
        Ok(())
    }

    /// Become a client and advertise; the handshake surfaces later as a Connect event.
    pub fn start_client(&mut self) -> Result<(), TransportError> {
        self.check_startable()?;
        self.role = Some(Role::Client);
        self.state = AdapterState::Connecting;
        self.bridge.start_advertising();
        tracing::info!(local_id = %self.local_id, "started client");
        Ok(())
    }

    fn check_startable(&self) -> Result<(), TransportError> {
        if let Some(role) = self.role {
            return Err(TransportError::AlreadyStarted { role });
        }
        if self.state != AdapterState::Initialized {
            return Err(TransportError::NotInitialized);
        }
        Ok(())
    }

    /// Return the next network event without blocking.
    ///
    /// Topology changes win over data so the consumer learns about a peer
    /// before its data and stops expecting data once it is gone:
    /// pending connect (client), pending disconnect (server), oldest packet, Idle.
    pub fn poll_event(&mut self) -> NetworkEvent {
        if self.role == Some(Role::Client) {
            if let Some(server_id) = self.inbound.signal.consume_connect() {
                self.server_id = server_id;
                if self.state == AdapterState::Connecting {
                    self.state = AdapterState::Active;
                }
                tracing::info!(%server_id, "connected to server");
                return NetworkEvent::Connect {
                    peer: server_id,
                    channel: Channel::DEFAULT_MESSAGE,
                    receive_time: self.elapsed(),
                };
            }
        }

        if self.role == Some(Role::Server) {
            if let Some(peer) = self.inbound.signal.consume_disconnect() {
                tracing::info!(%peer, "peer left the session");
                return NetworkEvent::Disconnect {
                    peer,
                    channel: Channel::DEFAULT_MESSAGE,
                    receive_time: self.elapsed(),
                };
            }
        }

        if let Some(packet) = self.inbound.queue.try_dequeue() {
            return NetworkEvent::Data {
                peer: packet.source,
                payload: packet.payload,
                channel: packet.channel,
                receive_time: self.elapsed(),
            };
        }

        NetworkEvent::Idle
    }

    /// Drain events until Idle. The iterator ends at the first Idle and does not yield it.
    pub fn events(&mut self) -> Events<'_, B> {
        Events { adapter: self }
    }

    /// Copy `payload` and hand it to the native session. Fire-and-forget.
    pub fn send(&self, peer: PeerId, payload: &[u8], channel: Channel) {
        if self.state == AdapterState::Uninitialized {
            tracing::warn!(%peer, %channel, "send before init; dropping {} bytes", payload.len());
            return;
        }
        tracing::trace!(%peer, %channel, len = payload.len(), "send");
        self.bridge.send_data(peer, payload.to_vec(), channel);
    }

    /// Not measured by the native session; always zero.
    pub fn current_rtt(&self, _peer: PeerId) -> Duration {
        Duration::ZERO
    }

    /// Server only. The native session can only drop every peer at once, so
    /// this disconnects all clients, not just `peer`.
    pub fn disconnect_remote_client(&mut self, peer: PeerId) -> Result<(), TransportError> {
        if self.role != Some(Role::Server) {
            return Err(TransportError::WrongRole {
                operation: "disconnect_remote_client",
                role: self.role,
            });
        }
        tracing::warn!(%peer, "disconnecting all peers; single-peer disconnect is unavailable");
        self.bridge.disconnect_all_peers();
        Ok(())
    }

    pub fn disconnect_local_client(&mut self) -> Result<(), TransportError> {
        tracing::info!(local_id = %self.local_id, "disconnect_local_client requested");
        Err(TransportError::NotImplemented("disconnect_local_client"))
    }

    /// Marks the adapter as shutting down and reports that teardown is not implemented.
    /// Native callbacks may still arrive and remain pollable.
    pub fn shutdown(&mut self) -> Result<(), TransportError> {
        tracing::info!(local_id = %self.local_id, state = ?self.state, "shutdown requested");
        self.state = AdapterState::ShuttingDown;
        Err(TransportError::NotImplemented("shutdown"))
    }

    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    /// Server's id: our own as server, the accepting server's once connected as client.
    pub fn server_id(&self) -> PeerId {
        self.server_id
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// A callback sink feeding this adapter.
    pub fn inbound(&self) -> InboundHandle {
        InboundHandle::new(self.inbound.clone())
    }

    pub fn session(&self) -> SessionState {
        SessionState {
            local_id: self.local_id,
            server_id: self.server_id,
            role: self.role,
            pending_connect: self.inbound.signal.peek_connect().is_some(),
            pending_disconnect: self.inbound.signal.peek_disconnect(),
        }
    }

    /// Time since the adapter was created; the clock behind `receive_time`.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Iterator returned by [`TransportAdapter::events`].
pub struct Events<'a, B: NativeBridge> {
    adapter: &'a mut TransportAdapter<B>,
}

impl<B: NativeBridge> Iterator for Events<'_, B> {
    type Item = NetworkEvent;

    fn next(&mut self) -> Option<NetworkEvent> {
        match self.adapter.poll_event() {
            NetworkEvent::Idle => None,
            event => Some(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Init(String, String),
        Browse,
        Advertise,
        Send(PeerId, Vec<u8>, Channel),
        DisconnectAll,
    }

    /// Bridge that records every request and keeps the inbound handle for the test to drive.
    #[derive(Default)]
    struct RecordingBridge {
        calls: Mutex<Vec<Call>>,
        inbound: Mutex<Option<InboundHandle>>,
    }

    impl RecordingBridge {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn inbound(&self) -> InboundHandle {
            self.inbound.lock().clone().expect("bridge not initialized")
        }
    }

    impl NativeBridge for RecordingBridge {
        fn init(&self, service_type: &str, local_id: &str, inbound: InboundHandle) {
            self.calls
                .lock()
                .push(Call::Init(service_type.to_string(), local_id.to_string()));
            *self.inbound.lock() = Some(inbound);
        }
        fn start_browsing(&self) {
            self.calls.lock().push(Call::Browse);
        }
        fn start_advertising(&self) {
            self.calls.lock().push(Call::Advertise);
        }
        fn send_data(&self, peer: PeerId, payload: Vec<u8>, channel: Channel) {
            self.calls.lock().push(Call::Send(peer, payload, channel));
        }
        fn disconnect_all_peers(&self) {
            self.calls.lock().push(Call::DisconnectAll);
        }
    }

    fn adapter() -> TransportAdapter<RecordingBridge> {
        let config = TransportConfig {
            id_seed: Some(99),
            ..TransportConfig::default()
        };
        TransportAdapter::new(config, RecordingBridge::default())
    }

    fn client() -> TransportAdapter<RecordingBridge> {
        let mut a = adapter();
        a.init();
        a.start_client().unwrap();
        a
    }

    fn server() -> TransportAdapter<RecordingBridge> {
        let mut a = adapter();
        a.init();
        a.start_server().unwrap();
        a
    }

    #[test]
    fn init_allocates_once_and_forwards_descriptor() {
        let mut a = adapter();
        assert_eq!(a.local_id(), PeerId::NONE);
        a.init();
        let id = a.local_id();
        assert!(id.get() >= 1 && id.get() < 1_000_000);
        assert_eq!(a.state(), AdapterState::Initialized);
        assert_eq!(
            a.bridge().calls(),
            vec![Call::Init("ar-collab".into(), id.to_string())]
        );

        a.init();
        assert_eq!(a.local_id(), id);
        assert_eq!(a.bridge().calls().len(), 1);
    }

    #[test]
    fn invalid_service_type_is_fail_soft() {
        let mut a = TransportAdapter::new(
            TransportConfig::with_service_type(""),
            RecordingBridge::default(),
        );
        a.init();
        assert_eq!(a.state(), AdapterState::Uninitialized);
        assert_eq!(a.local_id(), PeerId::NONE);
        assert!(a.bridge().calls().is_empty());
        assert!(matches!(a.start_server(), Err(TransportError::NotInitialized)));
    }

    #[test]
    fn server_owns_server_id_and_browses() {
        let a = server();
        assert_eq!(a.role(), Some(Role::Server));
        assert_eq!(a.server_id(), a.local_id());
        assert_eq!(a.state(), AdapterState::Active);
        assert_eq!(a.bridge().calls()[1], Call::Browse);
    }

    #[test]
    fn role_is_fixed_once_started() {
        let mut a = client();
        assert!(matches!(
            a.start_server(),
            Err(TransportError::AlreadyStarted { role: Role::Client })
        ));
        assert_eq!(a.role(), Some(Role::Client));
        assert_eq!(a.bridge().calls()[1], Call::Advertise);
    }

    #[test]
    fn client_sees_connect_then_idle() {
        let mut a = client();
        assert_eq!(a.state(), AdapterState::Connecting);
        a.bridge().inbound().on_connection_accepted(PeerId(42));
        assert!(a.session().pending_connect);

        match a.poll_event() {
            NetworkEvent::Connect { peer, channel, .. } => {
                assert_eq!(peer, PeerId(42));
                assert_eq!(channel, Channel::DEFAULT_MESSAGE);
            }
            other => panic!("expected Connect, got {other:?}"),
        }
        assert_eq!(a.server_id(), PeerId(42));
        assert_eq!(a.state(), AdapterState::Active);
        assert_eq!(a.poll_event(), NetworkEvent::Idle);
    }

    #[test]
    fn connect_is_surfaced_before_queued_data() {
        let mut a = client();
        let inbound = a.bridge().inbound();
        inbound.on_data_received(PeerId(42), &b"early"[..], Channel(3));
        inbound.on_connection_accepted(PeerId(42));

        assert!(matches!(a.poll_event(), NetworkEvent::Connect { .. }));
        match a.poll_event() {
            NetworkEvent::Data { peer, payload, channel, .. } => {
                assert_eq!(peer, PeerId(42));
                assert_eq!(payload, b"early");
                assert_eq!(channel, Channel(3));
            }
            other => panic!("expected Data, got {other:?}"),
        }
        assert!(a.poll_event().is_idle());
    }

    #[test]
    fn server_sees_disconnect_before_data() {
        let mut a = server();
        let inbound = a.bridge().inbound();
        inbound.on_data_received(PeerId(5), vec![1, 2], Channel::INTERNAL);
        inbound.on_peer_disconnected(PeerId(5));
        inbound.on_peer_disconnected(PeerId(7));

        assert!(matches!(
            a.poll_event(),
            NetworkEvent::Disconnect { peer: PeerId(7), .. }
        ));
        assert!(matches!(a.poll_event(), NetworkEvent::Data { peer: PeerId(5), .. }));
        assert!(a.poll_event().is_idle());
    }

    #[test]
    fn latches_are_role_gated() {
        let mut s = server();
        s.bridge().inbound().on_connection_accepted(PeerId(3));
        assert!(s.poll_event().is_idle());
        assert!(s.session().pending_connect);

        let mut c = client();
        c.bridge().inbound().on_peer_disconnected(PeerId(3));
        assert!(c.poll_event().is_idle());
        assert_eq!(c.session().pending_disconnect, Some(PeerId(3)));
    }

    #[test]
    fn data_keeps_arrival_order_across_channels() {
        let mut a = server();
        let inbound = a.bridge().inbound();
        for (payload, channel) in [(b'A', 1), (b'B', 0), (b'C', 1)] {
            inbound.on_data_received(PeerId(11), vec![payload], Channel(channel));
        }
        let got: Vec<(Vec<u8>, Channel)> = a
            .events()
            .map(|e| match e {
                NetworkEvent::Data { payload, channel, .. } => (payload, channel),
                other => panic!("expected Data, got {other:?}"),
            })
            .collect();
        assert_eq!(
            got,
            vec![
                (b"A".to_vec(), Channel(1)),
                (b"B".to_vec(), Channel(0)),
                (b"C".to_vec(), Channel(1)),
            ]
        );
    }

    #[test]
    fn idle_is_terminal() {
        let mut a = client();
        a.bridge().inbound().on_connection_accepted(PeerId(8));
        a.bridge().inbound().on_data_received(PeerId(8), vec![0], Channel(0));
        assert_eq!(a.events().count(), 2);
        let before = a.session();
        for _ in 0..100 {
            assert_eq!(a.poll_event(), NetworkEvent::Idle);
        }
        assert_eq!(a.session(), before);
    }

    #[test]
    fn receive_time_is_monotonic() {
        let mut a = server();
        let inbound = a.bridge().inbound();
        inbound.on_data_received(PeerId(1), vec![1], Channel(0));
        inbound.on_data_received(PeerId(1), vec![2], Channel(0));
        let times: Vec<Duration> = a
            .events()
            .map(|e| match e {
                NetworkEvent::Data { receive_time, .. } => receive_time,
                other => panic!("expected Data, got {other:?}"),
            })
            .collect();
        assert!(times[0] <= times[1]);
    }

    #[test]
    fn send_copies_caller_buffer() {
        let a = server();
        let mut buf = vec![1u8, 2, 3, 4];
        a.send(PeerId(9), &buf[1..3], Channel::RELIABLE_RPC);
        buf.fill(0);
        assert_eq!(
            a.bridge().calls().last(),
            Some(&Call::Send(PeerId(9), vec![2, 3], Channel::RELIABLE_RPC))
        );
    }

    #[test]
    fn send_before_init_is_dropped() {
        let a = adapter();
        a.send(PeerId(9), b"x", Channel(0));
        assert!(a.bridge().calls().is_empty());
    }

    #[test]
    fn rtt_is_zero_sentinel() {
        let a = client();
        assert_eq!(a.current_rtt(PeerId(1)), Duration::ZERO);
        assert_eq!(a.current_rtt(PeerId::NONE), Duration::ZERO);
    }

    #[test]
    fn remote_disconnect_is_server_only_and_drops_everyone() {
        let mut c = client();
        assert!(matches!(
            c.disconnect_remote_client(PeerId(1)),
            Err(TransportError::WrongRole { role: Some(Role::Client), .. })
        ));
        let mut s = server();
        s.disconnect_remote_client(PeerId(1)).unwrap();
        assert_eq!(s.bridge().calls().last(), Some(&Call::DisconnectAll));
    }

    #[test]
    fn teardown_reports_not_implemented() {
        let mut a = client();
        assert!(matches!(
            a.disconnect_local_client(),
            Err(TransportError::NotImplemented("disconnect_local_client"))
        ));
        assert!(matches!(
            a.shutdown(),
            Err(TransportError::NotImplemented("shutdown"))
        ));
        assert_eq!(a.state(), AdapterState::ShuttingDown);

        a.bridge().inbound().on_connection_accepted(PeerId(2));
        assert!(matches!(a.poll_event(), NetworkEvent::Connect { peer: PeerId(2), .. }));
        assert_eq!(a.state(), AdapterState::ShuttingDown);
    }
}
