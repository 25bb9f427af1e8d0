//! Loopback session: a server echoing client state updates, pumped once per tick
//! the way a game loop drains its transport.

use std::time::Duration;

use anyhow::{bail, Context};
use peerlink_core::{
    Channel, LoopbackBridge, LoopbackHub, NetworkEvent, PeerId, TransportAdapter, TransportConfig,
    TransportError,
};

use crate::config::Config;

type Adapter = TransportAdapter<LoopbackBridge>;

/// Counters collected over a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub rounds: u32,
    pub connects: usize,
    pub disconnects: usize,
    pub server_packets: usize,
    pub client_packets: usize,
    pub bytes: usize,
}

impl Report {
    pub fn log(&self) {
        tracing::info!(
            rounds = self.rounds,
            connects = self.connects,
            disconnects = self.disconnects,
            server_packets = self.server_packets,
            client_packets = self.client_packets,
            bytes = self.bytes,
            "session finished"
        );
    }
}

fn new_adapter(hub: &LoopbackHub, cfg: &Config) -> anyhow::Result<Adapter> {
    let mut a = TransportAdapter::new(TransportConfig::with_service_type(&cfg.service_type), hub.bridge());
    a.init();
    if a.local_id().is_none() {
        bail!("peer failed to initialize with service type {:?}", cfg.service_type);
    }
    Ok(a)
}

/// State update: round number (LE) followed by filler derived from the sender id.
fn state_update(round: u32, sender: PeerId, size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(size.max(4));
    out.extend_from_slice(&round.to_le_bytes());
    let fill = (sender.get() % 251) as u8;
    out.resize(size.max(4), fill);
    out
}

pub async fn run(cfg: &Config) -> anyhow::Result<Report> {
    let hub = LoopbackHub::new();
    let mut server = new_adapter(&hub, cfg)?;
    server.start_server().context("starting server")?;

    let mut clients = Vec::with_capacity(cfg.clients);
    for _ in 0..cfg.clients {
        let mut c = new_adapter(&hub, cfg)?;
        c.start_client().context("starting client")?;
        clients.push(c);
    }
    tracing::info!(server = %server.local_id(), clients = clients.len(), "peers started");

    let mut report = Report::default();
    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.tick_ms.max(1)));
    for round in 0..cfg.rounds {
        ticker.tick().await;

        if cfg.drop_client_at == Some(round) {
            if let Some(gone) = clients.pop() {
                tracing::info!(peer = %gone.local_id(), round, "client out of range");
                hub.drop_node(gone.local_id());
            }
        }

        for c in &mut clients {
            pump_client(c, &mut report);
            if !c.server_id().is_none() {
                let update = state_update(round, c.local_id(), cfg.payload_size);
                c.send(c.server_id(), &update, Channel::POSITION_UPDATE);
            }
        }
        pump_server(&mut server, &mut report);
        report.rounds += 1;
    }
    // echoes from the last round
    for c in &mut clients {
        pump_client(c, &mut report);
    }

    match server.shutdown() {
        Err(TransportError::NotImplemented(op)) => tracing::info!(op, "teardown not implemented; leaving session open"),
        other => tracing::warn!(?other, "unexpected shutdown result"),
    }
    Ok(report)
}

fn pump_server(server: &mut Adapter, report: &mut Report) {
    let mut echoes = Vec::new();
    for event in server.events() {
        match event {
            NetworkEvent::Data { peer, payload, channel, .. } => {
                report.server_packets += 1;
                report.bytes += payload.len();
                echoes.push((peer, payload, channel));
            }
            NetworkEvent::Disconnect { peer, .. } => {
                report.disconnects += 1;
                tracing::info!(%peer, "server saw client leave");
            }
            NetworkEvent::Connect { .. } | NetworkEvent::Idle => {}
        }
    }
    for (peer, payload, channel) in echoes {
        server.send(peer, &payload, channel);
    }
}

fn pump_client(client: &mut Adapter, report: &mut Report) {
    let mut hello = None;
    for event in client.events() {
        match event {
            NetworkEvent::Connect { peer, .. } => {
                report.connects += 1;
                tracing::info!(client = %peer, "client connected");
                hello = Some(peer);
            }
            NetworkEvent::Data { payload, .. } => {
                report.client_packets += 1;
                report.bytes += payload.len();
            }
            NetworkEvent::Disconnect { .. } | NetworkEvent::Idle => {}
        }
    }
    if let Some(server) = hello {
        client.send(server, b"hello", Channel::INTERNAL);
    }
    tracing::debug!(client = %client.local_id(), rtt = ?client.current_rtt(client.server_id()), "pumped");
}
