//! Local peer identity: the numeric id this process uses for the whole session.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Smallest id the allocator hands out. 0 is reserved for "no peer".
pub const MIN_CLIENT_ID: u64 = 1;

/// Exclusive upper bound of allocated ids.
pub const MAX_CLIENT_ID: u64 = 1_000_000;

/// Peer identity on the session. Opaque; only collision-improbable, not globally unique.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl PeerId {
    /// "No peer". Never allocated; rejected by the connection latches.
    pub const NONE: PeerId = PeerId(0);

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The native session layer carries peer ids as display names, so they round-trip through strings.
impl FromStr for PeerId {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.trim().parse::<u64>()?;
        Ok(PeerId(id))
    }
}

impl From<u64> for PeerId {
    fn from(id: u64) -> Self {
        PeerId(id)
    }
}

/// Draws the local peer id uniformly from `[MIN_CLIENT_ID, MAX_CLIENT_ID)`.
///
/// No collision detection is done: with a million-wide range and a handful of
/// devices per session the odds of two peers drawing the same id are accepted
/// as negligible. Two processes seeded from the same clock reading will collide.
pub struct ClientIdAllocator {
    rng: StdRng,
}

impl ClientIdAllocator {
    /// Seed from the wall clock at nanosecond resolution.
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::with_seed(nanos)
    }

    /// Deterministic allocator; same seed, same id sequence.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn allocate(&mut self) -> PeerId {
        PeerId(self.rng.gen_range(MIN_CLIENT_ID..MAX_CLIENT_ID))
    }
}
