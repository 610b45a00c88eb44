// Ad hoc BLE transport core
#![allow(clippy::empty_line_after_doc_comments)]
//
// Moves opaque byte messages between devices over one GATT characteristic.
// Messages larger than the negotiated MTU are framed, paced, written and
// reassembled here; the host BLE stack only moves single frames.

pub mod config;
pub mod transport;

pub use config::{ConfigError, TransportConfig, DEFAULT_MTU};
pub use transport::ble::{
    decode, encode, BufferState, CodecError, Frame, FrameFlag, ReassemblyBuffer, ReassemblyError,
};
pub use transport::{
    channel_sink, dispatch_platform_event, start_service, BridgeEvent, ConnectionState,
    CycleState, DiscoveredPeer, DiscoveryDeduplicator, EventSink, GattPlatform, NullSink,
    PeerId, PeerRegistry, PlatformEvent, ServiceHandle, TransportEngine, TransportError,
    CHARACTERISTIC_UUID, SERVICE_UUID,
};

/// Install the global tracing subscriber.
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. Calling this more
/// than once is harmless; only the first subscriber wins.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Same as [`init_logging`] but emits one JSON object per line, for hosts
/// that ship logs to a collector
pub fn init_json_logging() {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
