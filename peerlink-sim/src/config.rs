//! Load simulator config from file and environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Simulator configuration. File: `--config <path>`, else ~/.config/peerlink/sim.toml.
/// Env overrides: PEERLINK_SERVICE_TYPE, PEERLINK_CLIENTS, PEERLINK_ROUNDS, PEERLINK_TICK_MS.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Discovery service type shared by every simulated peer (default "ar-collab").
    #[serde(default = "default_service_type")]
    pub service_type: String,
    /// Number of client peers (default 3).
    #[serde(default = "default_clients")]
    pub clients: usize,
    /// Ticks to run (default 20).
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    /// Tick interval in milliseconds (default 16).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Bytes per client state update (default 256, minimum 4).
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    /// Round at which the last client drops out of range. Unset: nobody leaves.
    #[serde(default)]
    pub drop_client_at: Option<u32>,
}

fn default_service_type() -> String {
    "ar-collab".to_string()
}
fn default_clients() -> usize {
    3
}
fn default_rounds() -> u32 {
    20
}
fn default_tick_ms() -> u64 {
    16
}
fn default_payload_size() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            clients: default_clients(),
            rounds: default_rounds(),
            tick_ms: default_tick_ms(),
            payload_size: default_payload_size(),
            drop_client_at: None,
        }
    }
}

/// Load config: defaults, then config file (if present), then env vars.
pub fn load(explicit: Option<&Path>) -> Config {
    let mut c = load_file(explicit).unwrap_or_default();
    apply_env(&mut c, |k| std::env::var(k).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("PEERLINK_SERVICE_TYPE") {
        c.service_type = s;
    }
    if let Some(n) = var("PEERLINK_CLIENTS").and_then(|s| s.parse().ok()) {
        c.clients = n;
    }
    if let Some(n) = var("PEERLINK_ROUNDS").and_then(|s| s.parse().ok()) {
        c.rounds = n;
    }
    if let Some(n) = var("PEERLINK_TICK_MS").and_then(|s| s.parse().ok()) {
        c.tick_ms = n;
    }
}

fn config_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(p) = explicit {
        return vec![p.to_path_buf()];
    }
    let mut out = Vec::new();
    if let Some(h) = std::env::var_os("HOME").map(PathBuf::from) {
        out.push(h.join(".config/peerlink/sim.toml"));
    }
    out
}

fn load_file(explicit: Option<&Path>) -> Option<Config> {
    for p in config_paths(explicit) {
        if !p.exists() {
            if explicit.is_some() {
                tracing::warn!(path = %p.display(), "config file not found; using defaults");
            }
            continue;
        }
        let s = match std::fs::read_to_string(&p) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(path = %p.display(), error = %e, "cannot read config file");
                return None;
            }
        };
        return match toml::from_str::<Config>(&s) {
            Ok(c) => {
                tracing::info!(path = %p.display(), "loaded config");
                Some(c)
            }
            Err(e) => {
                tracing::warn!(path = %p.display(), error = %e, "invalid config file; using defaults");
                None
            }
        };
    }
    None
}
