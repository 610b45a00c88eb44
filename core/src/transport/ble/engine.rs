//! Transport engine: send/receive contract over GATT
//!
//! Outbound messages are split against the peer's current capacity and written
//! frame by frame through the injected [`GattPlatform`], with bounded retry per
//! frame and burst pacing between groups of notifications. Inbound frames are
//! decoded, routed into the peer's reassembly buffer, and completed messages
//! are handed to the [`EventSink`]. All per-peer state lives in the
//! [`PeerRegistry`]; the engine keeps none of its own.

use super::frame::{self, CodecError, Frame};
use super::gatt::GattPlatform;
use super::reassembly::{BufferState, ReassemblyError};
use super::registry::PeerRegistry;
use crate::config::{ConfigError, TransportConfig};
use crate::transport::abstraction::{BridgeEvent, PeerId};
use crate::transport::sink::EventSink;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors for engine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Write failed for frame {frame_index} after {attempts} attempt(s)")]
    WriteFailed { frame_index: usize, attempts: u32 },
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] CodecError),
    #[error("Reassembly error: {0}")]
    Reassembly(#[from] ReassemblyError),
    #[error("Stream ids require multiplexing to be enabled")]
    StreamsDisabled,
}

pub struct TransportEngine {
    config: TransportConfig,
    registry: Arc<PeerRegistry>,
    platform: Arc<dyn GattPlatform>,
    sink: Arc<dyn EventSink>,
}

impl TransportEngine {
    /// Create an engine over an injected platform adapter and event sink
    pub fn new(
        config: TransportConfig,
        platform: Arc<dyn GattPlatform>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = Arc::new(PeerRegistry::new(&config));
        Ok(Self {
            config,
            registry,
            platform,
            sink,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    // ========================================================================
    // PLATFORM CALLBACKS
    // ========================================================================

    pub fn on_connection_state_changed(&self, peer: &PeerId, connected: bool) {
        if let Some(connected) = self.registry.on_connection_state_changed(peer, connected) {
            self.emit_connection(peer, connected);
        }
    }

    pub fn on_connection_pending(&self, peer: &PeerId) {
        self.registry.on_connection_pending(peer);
    }

    pub fn on_mtu_changed(&self, peer: &PeerId, mtu: u16) {
        if self.registry.on_mtu_changed(peer, mtu) {
            info!("MTU for unknown peer {}; registering as connected", peer);
            self.emit_connection(peer, true);
        }
    }

    pub fn on_bond_state_changed(&self, peer: &PeerId, bonded: bool) {
        debug!("Bond state for {}: {}", peer, bonded);
        self.sink.emit(BridgeEvent::Bond {
            peer: peer.clone(),
            bonded,
        });
    }

    /// Handle one characteristic write from a peer.
    ///
    /// Malformed frames are dropped and reported; they never tear down the
    /// link. Frames from a peer the platform has not reported (or already
    /// reported gone) are dropped without touching any state. A completed
    /// message is emitted exactly once.
    pub fn on_frame_received(&self, peer: &PeerId, raw: &[u8]) -> Result<(), TransportError> {
        let frame = match frame::decode(raw, self.config.multiplexed) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed frame from {}: {}", peer, e);
                return Err(TransportError::MalformedFrame(e));
            }
        };

        let stream_id = frame.stream_id;
        let outcome = self
            .registry
            .route_to_buffer(peer, stream_id, |buffer| buffer.append(frame));

        match outcome {
            None => {
                debug!("Dropping frame from unregistered peer {}", peer);
                Ok(())
            }
            Some(Ok(BufferState::InProgress)) => Ok(()),
            Some(Ok(BufferState::Complete(payload))) => {
                debug!("Message of {} bytes from {}", payload.len(), peer);
                self.sink.emit(BridgeEvent::Message {
                    peer: peer.clone(),
                    stream_id,
                    payload,
                });
                Ok(())
            }
            Some(Err(e)) => {
                let ReassemblyError::Overflow { limit, .. } = e;
                warn!("Reassembly overflow from {}: {}", peer, e);
                self.sink.emit(BridgeEvent::ReassemblyOverflow {
                    peer: peer.clone(),
                    stream_id,
                    limit,
                });
                Err(TransportError::Reassembly(e))
            }
        }
    }

    // ========================================================================
    // OUTBOUND
    // ========================================================================

    /// Send a message on the default stream
    pub fn send(&self, peer: &PeerId, message: &[u8]) -> Result<(), TransportError> {
        let stream_id = self.config.multiplexed.then_some(0);
        self.send_frames(peer, stream_id, message)
    }

    /// Send a message on a specific stream (multiplexed framing only)
    pub fn send_on_stream(
        &self,
        peer: &PeerId,
        stream_id: u8,
        message: &[u8],
    ) -> Result<(), TransportError> {
        if !self.config.multiplexed {
            return Err(TransportError::StreamsDisabled);
        }
        self.send_frames(peer, Some(stream_id), message)
    }

    fn send_frames(
        &self,
        peer: &PeerId,
        stream_id: Option<u8>,
        message: &[u8],
    ) -> Result<(), TransportError> {
        let slot = self
            .registry
            .slot(peer)
            .ok_or(TransportError::NotConnected)?;
        let _outbound = slot.lock_outbound();

        let capacity = {
            let state = slot.lock_state();
            if !state.is_sendable() {
                return Err(TransportError::NotConnected);
            }
            self.registry.capacity_for(state.mtu())
        };

        let frames = frame::encode(message, capacity, stream_id);
        debug!(
            "Sending {} bytes to {} in {} frame(s) of <= {} bytes",
            message.len(),
            peer,
            frames.len(),
            capacity
        );

        for (index, frame) in frames.iter().enumerate() {
            if index > 0 && self.config.pacing_enabled() && index % self.config.burst_size == 0 {
                std::thread::sleep(self.config.burst_pause());
            }

            // A disconnect between two frames abandons the rest of the message
            if !slot.lock_state().is_sendable() {
                warn!(
                    "Peer {} disconnected after {} of {} frame(s)",
                    peer,
                    index,
                    frames.len()
                );
                return Err(TransportError::NotConnected);
            }

            self.write_frame(peer, index, frame)?;
        }

        Ok(())
    }

    fn write_frame(&self, peer: &PeerId, index: usize, frame: &Frame) -> Result<(), TransportError> {
        let bytes = frame.to_bytes();
        let attempts = self.config.write_retry_attempts;

        for attempt in 1..=attempts {
            if self.platform.write_characteristic(peer, &bytes)
                && self.platform.notify_characteristic_changed(peer)
            {
                return Ok(());
            }

            if attempt < attempts {
                let delay = self.config.retry_backoff(attempt);
                warn!(
                    "Write of frame {} to {} not ready (attempt {}/{}), retrying in {:?}",
                    index, peer, attempt, attempts, delay
                );
                if delay > Duration::ZERO {
                    std::thread::sleep(delay);
                }
            }
        }

        warn!("Giving up on frame {} to {} after {} attempt(s)", index, peer, attempts);
        Err(TransportError::WriteFailed {
            frame_index: index,
            attempts,
        })
    }

    // ========================================================================
    // PEER MANAGEMENT
    // ========================================================================

    pub fn current_capacity(&self, peer: &PeerId) -> usize {
        self.registry.current_capacity(peer)
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.registry.connected_peers()
    }

    /// Drop the link to `peer` and forget its state without waiting for the
    /// platform's disconnect callback
    pub fn cancel_connection(&self, peer: &PeerId) {
        self.platform.cancel_connection(peer);
        self.on_connection_state_changed(peer, false);
    }

    /// Evict every peer, reporting each connected one as disconnected
    pub fn shutdown(&self) {
        for peer in self.registry.clear() {
            self.emit_connection(&peer, false);
        }
    }

    fn emit_connection(&self, peer: &PeerId, connected: bool) {
        self.sink.emit(BridgeEvent::Connection {
            peer: peer.clone(),
            connected,
        });
    }
}
