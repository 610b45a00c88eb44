//! Peer registry: per-peer connection state, MTU and reassembly buffers
//!
//! The registry is the only owner of per-peer state. The map itself sits
//! behind a `RwLock`; every peer has its own state `Mutex` so callbacks for
//! different peers never contend, plus an outbound `Mutex` that keeps two
//! concurrent sends to the same peer from interleaving their frames.

use super::reassembly::ReassemblyBuffer;
use crate::config::{TransportConfig, DEFAULT_MTU};
use crate::transport::abstraction::{ConnectionState, PeerId};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Mutable state of one peer
#[derive(Debug)]
pub struct PeerState {
    connection: ConnectionState,
    mtu: u16,
    buffers: HashMap<Option<u8>, ReassemblyBuffer>,
    max_message_size: usize,
    evicted: bool,
}

impl PeerState {
    fn new(connection: ConnectionState, mtu: u16, max_message_size: usize) -> Self {
        Self {
            connection,
            mtu,
            buffers: HashMap::new(),
            max_message_size,
            evicted: false,
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// True once the peer was removed from the registry; stale handles
    /// observe the peer as disconnected
    pub fn is_evicted(&self) -> bool {
        self.evicted
    }

    /// Connected and still registered
    pub fn is_sendable(&self) -> bool {
        !self.evicted && self.connection.is_connected()
    }

    /// Buffer for a stream, created empty on first use
    pub fn buffer_mut(&mut self, stream_id: Option<u8>) -> &mut ReassemblyBuffer {
        let max = self.max_message_size;
        self.buffers
            .entry(stream_id)
            .or_insert_with(|| ReassemblyBuffer::new(max))
    }

    fn evict(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.buffers.clear();
        self.evicted = true;
    }
}

/// Lock bundle for one peer
#[derive(Debug)]
pub struct PeerSlot {
    state: Mutex<PeerState>,
    outbound: Mutex<()>,
}

impl PeerSlot {
    fn new(state: PeerState) -> Self {
        Self {
            state: Mutex::new(state),
            outbound: Mutex::new(()),
        }
    }

    pub fn lock_state(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock()
    }

    /// Held for the whole frame sequence of one send
    pub fn lock_outbound(&self) -> MutexGuard<'_, ()> {
        self.outbound.lock()
    }
}

/// Registry of every peer the platform has told us about
pub struct PeerRegistry {
    peers: RwLock<HashMap<PeerId, Arc<PeerSlot>>>,
    default_mtu: u16,
    header_size: usize,
    max_message_size: usize,
}

impl PeerRegistry {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            default_mtu: config.default_mtu,
            header_size: config.header_size(),
            max_message_size: config.max_message_size,
        }
    }

    fn new_slot(&self, connection: ConnectionState) -> Arc<PeerSlot> {
        Arc::new(PeerSlot::new(PeerState::new(
            connection,
            self.default_mtu,
            self.max_message_size,
        )))
    }

    /// Apply a settled connection state from the platform.
    ///
    /// Returns `Some(connected)` when the connected view of the peer changed,
    /// `None` when the event repeats the current state. Disconnecting evicts
    /// the MTU and every buffer; partial messages are dropped without delivery.
    pub fn on_connection_state_changed(&self, peer: &PeerId, connected: bool) -> Option<bool> {
        let mut peers = self.peers.write();

        if connected {
            if let Some(slot) = peers.get(peer) {
                let mut state = slot.lock_state();
                if state.connection.is_connected() {
                    return None;
                }
                state.connection = ConnectionState::Connected;
            } else {
                peers.insert(peer.clone(), self.new_slot(ConnectionState::Connected));
            }
            info!("Peer {} connected", peer);
            return Some(true);
        }

        let slot = peers.remove(peer)?;
        let mut state = slot.lock_state();
        let was_connected = state.connection.is_connected();
        let dropped = state.buffers.values().filter(|b| b.is_in_progress()).count();
        state.evict();

        if dropped > 0 {
            debug!("Discarded {} partial message(s) from {}", dropped, peer);
        }
        info!("Peer {} disconnected", peer);
        was_connected.then_some(false)
    }

    /// Record an explicit pending phase. Returns true if the peer was unknown.
    pub fn on_connection_pending(&self, peer: &PeerId) -> bool {
        let mut peers = self.peers.write();
        if peers.contains_key(peer) {
            return false;
        }
        peers.insert(peer.clone(), self.new_slot(ConnectionState::Connecting));
        debug!("Peer {} connecting", peer);
        true
    }

    /// Record a negotiated MTU.
    ///
    /// MTU callbacks can overtake the connection callback, so an unknown peer
    /// is registered as connected. Returns true in that case.
    pub fn on_mtu_changed(&self, peer: &PeerId, mtu: u16) -> bool {
        let mut peers = self.peers.write();
        let created = !peers.contains_key(peer);
        let slot = peers
            .entry(peer.clone())
            .or_insert_with(|| self.new_slot(ConnectionState::Connected));
        slot.lock_state().mtu = mtu;

        debug!(
            "MTU for {} is now {} (capacity {})",
            peer,
            mtu,
            self.capacity_for(mtu)
        );
        created
    }

    /// Usable payload bytes per frame for an MTU. Anything below the BLE
    /// minimum of [`DEFAULT_MTU`] (including 0) is treated as the minimum.
    pub fn capacity_for(&self, mtu: u16) -> usize {
        (mtu.max(DEFAULT_MTU) as usize)
            .saturating_sub(self.header_size)
            .max(1)
    }

    pub fn current_capacity(&self, peer: &PeerId) -> usize {
        self.capacity_for(self.mtu(peer).unwrap_or(self.default_mtu))
    }

    /// Run `f` on the peer's buffer for `stream_id`, creating it empty on
    /// first use. An unknown or evicted peer gets a fresh empty buffer that
    /// is not stored, so this never registers anyone.
    pub fn with_buffer<R>(
        &self,
        peer: &PeerId,
        stream_id: Option<u8>,
        f: impl FnOnce(&mut ReassemblyBuffer) -> R,
    ) -> R {
        match self.with_registered_buffer(peer, stream_id, f) {
            Ok(result) => result,
            Err(f) => f(&mut ReassemblyBuffer::new(self.max_message_size)),
        }
    }

    /// Like [`with_buffer`](Self::with_buffer) but only for registered
    /// peers; `None` for anyone else. Inbound frames are routed through
    /// this so a frame can never complete a message for an unknown peer.
    pub fn route_to_buffer<R>(
        &self,
        peer: &PeerId,
        stream_id: Option<u8>,
        f: impl FnOnce(&mut ReassemblyBuffer) -> R,
    ) -> Option<R> {
        self.with_registered_buffer(peer, stream_id, f).ok()
    }

    fn with_registered_buffer<R, F>(&self, peer: &PeerId, stream_id: Option<u8>, f: F) -> Result<R, F>
    where
        F: FnOnce(&mut ReassemblyBuffer) -> R,
    {
        let Some(slot) = self.slot(peer) else {
            return Err(f);
        };
        let mut state = slot.lock_state();
        if state.is_evicted() {
            return Err(f);
        }
        Ok(f(state.buffer_mut(stream_id)))
    }

    pub fn slot(&self, peer: &PeerId) -> Option<Arc<PeerSlot>> {
        self.peers.read().get(peer).cloned()
    }

    pub fn state(&self, peer: &PeerId) -> ConnectionState {
        self.slot(peer)
            .map(|slot| slot.lock_state().connection())
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn mtu(&self, peer: &PeerId) -> Option<u16> {
        self.slot(peer).map(|slot| slot.lock_state().mtu())
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.state(peer).is_connected()
    }

    /// Connected peers, sorted by address
    pub fn connected_peers(&self) -> Vec<PeerId> {
        let peers = self.peers.read();
        let mut connected: Vec<PeerId> = peers
            .iter()
            .filter(|(_, slot)| slot.lock_state().connection().is_connected())
            .map(|(peer, _)| peer.clone())
            .collect();
        connected.sort();
        connected
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Evict every peer, returning those that were connected
    pub fn clear(&self) -> Vec<PeerId> {
        let mut peers = self.peers.write();
        let mut connected = Vec::new();
        for (peer, slot) in peers.drain() {
            let mut state = slot.lock_state();
            if state.connection().is_connected() {
                connected.push(peer);
            }
            state.evict();
        }
        connected.sort();
        connected
    }
}
