// Transport module: BLE GATT framing, peer state and the service task

pub mod abstraction;
pub mod ble;
pub mod service;
pub mod sink;

pub use abstraction::{BridgeEvent, ConnectionState, DiscoveredPeer, PeerId, PlatformEvent};
pub use ble::{
    CycleState, DiscoveryDeduplicator, GattPlatform, PeerRegistry, TransportEngine,
    TransportError, CHARACTERISTIC_UUID, SERVICE_UUID,
};
pub use service::{dispatch_platform_event, start_service, ServiceCommand, ServiceHandle};
pub use sink::{channel_sink, EventSink, NullSink};
