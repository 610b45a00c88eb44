/// Discovery de-duplication for BLE scan cycles
///
/// A scan reports the same advertiser many times. The deduplicator lets the
/// caller emit one "peer found" event per peer per cycle, and hands back the
/// whole set when the cycle ends.

use crate::transport::abstraction::{DiscoveredPeer, PeerId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Scan cycle state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleState {
    /// Accepting scan results
    Collecting,
    /// Cycle ended; the set is frozen until the next cycle starts
    Finished,
}

#[derive(Debug)]
struct Cycle {
    state: CycleState,
    seen: HashSet<PeerId>,
    order: Vec<DiscoveredPeer>,
    number: u64,
}

/// Per-cycle set of discovered peers, safe to feed from scan callbacks
#[derive(Debug)]
pub struct DiscoveryDeduplicator {
    cycle: Mutex<Cycle>,
}

impl DiscoveryDeduplicator {
    pub fn new() -> Self {
        Self {
            cycle: Mutex::new(Cycle {
                state: CycleState::Collecting,
                seen: HashSet::new(),
                order: Vec::new(),
                number: 0,
            }),
        }
    }

    /// Record a sighting. Returns true only the first time `peer` is seen in
    /// the current cycle; a finished cycle accepts nothing.
    pub fn on_peer_seen(&self, peer: &PeerId, name: Option<String>) -> bool {
        let mut cycle = self.cycle.lock();
        if cycle.state == CycleState::Finished || !cycle.seen.insert(peer.clone()) {
            return false;
        }
        cycle.order.push(DiscoveredPeer::new(peer.clone(), name));
        debug!("Discovered {} (cycle {})", peer, cycle.number);
        true
    }

    /// Start a new cycle, forgetting everything seen before
    pub fn on_cycle_started(&self) {
        let mut cycle = self.cycle.lock();
        cycle.seen.clear();
        cycle.order.clear();
        cycle.state = CycleState::Collecting;
        cycle.number += 1;
    }

    /// Freeze the cycle and return the peers collected, in discovery order
    pub fn on_cycle_finished(&self) -> Vec<DiscoveredPeer> {
        let mut cycle = self.cycle.lock();
        cycle.state = CycleState::Finished;
        debug!(
            "Discovery cycle {} finished with {} peer(s)",
            cycle.number,
            cycle.order.len()
        );
        cycle.order.clone()
    }

    pub fn state(&self) -> CycleState {
        self.cycle.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == CycleState::Collecting
    }

    /// Snapshot of the current cycle's peers
    pub fn peers(&self) -> Vec<DiscoveredPeer> {
        self.cycle.lock().order.clone()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.cycle.lock().seen.contains(peer)
    }

    pub fn len(&self) -> usize {
        self.cycle.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of cycles started so far
    pub fn cycle_number(&self) -> u64 {
        self.cycle.lock().number
    }
}

impl Default for DiscoveryDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}
