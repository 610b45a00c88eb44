/// GATT service definition and the platform adapter contract
///
/// The host BLE stack (Android `BluetoothGattServer`, CoreBluetooth, BlueZ)
/// is not driven from here. The engine only needs to put a value on the
/// message characteristic, notify the peer, and occasionally drop a link.

use crate::transport::abstraction::PeerId;
use uuid::Uuid;

/// Primary service advertised by every node
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x00000001_0000_1000_8000_00805f9b34fb);

/// Read/write/notify characteristic carrying frames
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x00000002_0000_1000_8000_00805f9b34fb);

/// Capabilities the engine needs from the host BLE stack.
///
/// Implementations must not call back into the engine for the same peer from
/// inside these methods on another thread and then wait for it.
#[cfg_attr(test, mockall::automock)]
pub trait GattPlatform: Send + Sync {
    /// Set the characteristic value for `peer`. `false` means the stack was
    /// not ready and the write may be retried.
    fn write_characteristic(&self, peer: &PeerId, value: &[u8]) -> bool;

    /// Push the current characteristic value to `peer`
    fn notify_characteristic_changed(&self, peer: &PeerId) -> bool;

    /// Ask the stack to tear down the link to `peer`
    fn cancel_connection(&self, peer: &PeerId);
}
