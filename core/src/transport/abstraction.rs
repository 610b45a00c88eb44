//! Transport abstraction layer for the ad hoc BLE transport
//!
//! Defines the shared identifiers, the inbound platform events and the
//! outbound bridge events exchanged with the plugin glue layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a remote peer, canonically its hardware address.
///
/// Addresses are trimmed and upper-cased on construction so that
/// `aa:bb:cc:dd:ee:ff` and `AA:BB:CC:DD:EE:FF` name the same peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PeerId(String);

impl PeerId {
    /// Create a normalized peer identifier
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PeerId {
    fn from(address: String) -> Self {
        Self::new(address)
    }
}

impl From<&str> for PeerId {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<PeerId> for String {
    fn from(peer: PeerId) -> Self {
        peer.0
    }
}

/// Link state of a peer as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link (entries in this state are removed from the registry)
    Disconnected,
    /// The platform signalled an explicit pending phase
    Connecting,
    /// Link established
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// A peer reported by a discovery cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPeer {
    /// Hardware address of the peer
    pub peer: PeerId,
    /// Advertised device name, when the scan record carried one
    pub name: Option<String>,
}

impl DiscoveredPeer {
    pub fn new(peer: PeerId, name: Option<String>) -> Self {
        Self { peer, name }
    }
}

// ============================================================================
// PLATFORM -> CORE
// ============================================================================

/// Callbacks delivered by the host BLE stack, modeled as plain events
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    /// `onConnectionStateChange` with a settled state
    ConnectionStateChanged { peer: PeerId, connected: bool },
    /// The platform reported an explicit pending connection
    ConnectionPending { peer: PeerId },
    /// `onMtuChanged`
    MtuChanged { peer: PeerId, mtu: u16 },
    /// `onCharacteristicWriteRequest`: one raw frame from a peer
    CharacteristicWriteRequest { peer: PeerId, value: Vec<u8> },
    /// Bonding finished or was removed
    BondStateChanged { peer: PeerId, bonded: bool },
    /// A new scan cycle started
    DiscoveryStarted,
    /// A scan result arrived
    PeerDiscovered { peer: PeerId, name: Option<String> },
    /// The scan cycle ended
    DiscoveryFinished,
}

impl fmt::Display for PlatformEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformEvent::ConnectionStateChanged { peer, connected } => {
                write!(f, "ConnectionStateChanged {{ peer: {}, connected: {} }}", peer, connected)
            }
            PlatformEvent::ConnectionPending { peer } => {
                write!(f, "ConnectionPending {{ peer: {} }}", peer)
            }
            PlatformEvent::MtuChanged { peer, mtu } => {
                write!(f, "MtuChanged {{ peer: {}, mtu: {} }}", peer, mtu)
            }
            PlatformEvent::CharacteristicWriteRequest { peer, value } => write!(
                f,
                "CharacteristicWriteRequest {{ peer: {}, len: {} }}",
                peer,
                value.len()
            ),
            PlatformEvent::BondStateChanged { peer, bonded } => {
                write!(f, "BondStateChanged {{ peer: {}, bonded: {} }}", peer, bonded)
            }
            PlatformEvent::DiscoveryStarted => write!(f, "DiscoveryStarted"),
            PlatformEvent::PeerDiscovered { peer, .. } => {
                write!(f, "PeerDiscovered {{ peer: {} }}", peer)
            }
            PlatformEvent::DiscoveryFinished => write!(f, "DiscoveryFinished"),
        }
    }
}

// ============================================================================
// CORE -> BRIDGE
// ============================================================================

/// Events forwarded to the application event bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    /// Net change of a peer's connected view
    #[serde(rename = "ConnectionEvent")]
    Connection { peer: PeerId, connected: bool },
    /// A fully reassembled message
    #[serde(rename = "MessageEvent")]
    Message {
        peer: PeerId,
        stream_id: Option<u8>,
        payload: Vec<u8>,
    },
    /// Terminal discovery signal with everything seen in the cycle
    #[serde(rename = "DiscoveryEvent")]
    Discovery { peers: Vec<DiscoveredPeer> },
    /// First sighting of a peer in the current cycle
    #[serde(rename = "PeerFoundEvent")]
    PeerFound { peer: PeerId, name: Option<String> },
    #[serde(rename = "BondEvent")]
    Bond { peer: PeerId, bonded: bool },
    /// A peer overflowed its reassembly buffer; the caller may drop it
    #[serde(rename = "OverflowEvent")]
    ReassemblyOverflow {
        peer: PeerId,
        stream_id: Option<u8>,
        limit: usize,
    },
}

impl BridgeEvent {
    /// Serialize for a bridge that carries JSON maps
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Peer the event concerns, if any
    pub fn peer(&self) -> Option<&PeerId> {
        match self {
            BridgeEvent::Connection { peer, .. }
            | BridgeEvent::Message { peer, .. }
            | BridgeEvent::PeerFound { peer, .. }
            | BridgeEvent::Bond { peer, .. }
            | BridgeEvent::ReassemblyOverflow { peer, .. } => Some(peer),
            BridgeEvent::Discovery { .. } => None,
        }
    }
}

impl fmt::Display for BridgeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeEvent::Connection { peer, connected } => {
                write!(f, "Connection {{ peer: {}, connected: {} }}", peer, connected)
            }
            BridgeEvent::Message {
                peer,
                stream_id,
                payload,
            } => write!(
                f,
                "Message {{ peer: {}, stream: {:?}, len: {} }}",
                peer,
                stream_id,
                payload.len()
            ),
            BridgeEvent::Discovery { peers } => {
                write!(f, "Discovery {{ peers: {} }}", peers.len())
            }
            BridgeEvent::PeerFound { peer, .. } => write!(f, "PeerFound {{ peer: {} }}", peer),
            BridgeEvent::Bond { peer, bonded } => {
                write!(f, "Bond {{ peer: {}, bonded: {} }}", peer, bonded)
            }
            BridgeEvent::ReassemblyOverflow { peer, limit, .. } => {
                write!(f, "ReassemblyOverflow {{ peer: {}, limit: {} }}", peer, limit)
            }
        }
    }
}
