/// BLE (Bluetooth Low Energy) GATT Transport Module
///
/// Message transport over a single GATT characteristic. It includes:
///
/// - **frame**: Wire framing (flag byte, optional stream id, payload)
/// - **reassembly**: Bounded per-stream reassembly of inbound frames
/// - **registry**: Per-peer connection state, negotiated MTU and buffers
/// - **engine**: Send/receive contract with write retry and burst pacing
/// - **discovery**: Per-cycle de-duplication of scan results
/// - **gatt**: Service/characteristic UUIDs and the platform adapter trait
///
/// The host BLE stack (Kotlin/Swift) owns the radio. Everything here is
/// testable without hardware by injecting a [`GattPlatform`] double.

pub mod discovery;
pub mod engine;
pub mod frame;
pub mod gatt;
pub mod reassembly;
pub mod registry;

// Re-export commonly used types
pub use discovery::{CycleState, DiscoveryDeduplicator};

pub use engine::{TransportEngine, TransportError};

pub use frame::{decode, encode, header_size, CodecError, Frame, FrameFlag};

pub use gatt::{GattPlatform, CHARACTERISTIC_UUID, SERVICE_UUID};

pub use reassembly::{BufferState, ReassemblyBuffer, ReassemblyError};

pub use registry::{PeerRegistry, PeerSlot, PeerState};
