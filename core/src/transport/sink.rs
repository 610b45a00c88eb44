//! Event sink: single-consumer delivery of bridge events
//!
//! The core never talks to the UI thread directly. Whatever owns the bridge
//! hands in a sink; the stock one is a tokio unbounded channel whose receiver
//! is drained by the bridge's dispatch task.

use super::abstraction::BridgeEvent;
use tokio::sync::mpsc;
use tracing::debug;

/// Receives events destined for the application bridge
pub trait EventSink: Send + Sync {
    fn emit(&self, event: BridgeEvent);
}

impl EventSink for mpsc::UnboundedSender<BridgeEvent> {
    fn emit(&self, event: BridgeEvent) {
        if self.send(event).is_err() {
            debug!("Event bridge receiver dropped; event discarded");
        }
    }
}

/// Sink that drops everything, for engines without a bridge attached
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: BridgeEvent) {}
}

/// Create a channel-backed sink and its receiving end
pub fn channel_sink() -> (
    mpsc::UnboundedSender<BridgeEvent>,
    mpsc::UnboundedReceiver<BridgeEvent>,
) {
    mpsc::unbounded_channel()
}
