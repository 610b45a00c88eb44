// Shared test doubles for the integration tests

#![allow(dead_code)]

use adhoc_transport_core::{BridgeEvent, EventSink, GattPlatform, PeerId, TransportEngine};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

type WriteHook = Box<dyn FnMut(usize, &PeerId, &[u8]) + Send>;

/// Platform double that records every call
#[derive(Default)]
pub struct RecordingPlatform {
    writes: Mutex<Vec<(PeerId, Vec<u8>)>>,
    notifies: AtomicUsize,
    cancelled: Mutex<Vec<PeerId>>,
    failures_left: AtomicUsize,
    hook: Mutex<Option<WriteHook>>,
}

impl RecordingPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Report the next `n` writes as not ready
    pub fn fail_next_writes(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Run `hook` after every accepted write with its 0-based index
    pub fn on_write(&self, hook: impl FnMut(usize, &PeerId, &[u8]) + Send + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn writes(&self) -> Vec<(PeerId, Vec<u8>)> {
        self.writes.lock().clone()
    }

    pub fn frame_lengths(&self) -> Vec<usize> {
        self.writes.lock().iter().map(|(_, v)| v.len()).collect()
    }

    pub fn notify_count(&self) -> usize {
        self.notifies.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> Vec<PeerId> {
        self.cancelled.lock().clone()
    }

    pub fn clear(&self) {
        self.writes.lock().clear();
        self.notifies.store(0, Ordering::SeqCst);
    }
}

impl GattPlatform for RecordingPlatform {
    fn write_characteristic(&self, peer: &PeerId, value: &[u8]) -> bool {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return false;
        }

        let index = {
            let mut writes = self.writes.lock();
            writes.push((peer.clone(), value.to_vec()));
            writes.len() - 1
        };
        if let Some(hook) = self.hook.lock().as_mut() {
            hook(index, peer, value);
        }
        true
    }

    fn notify_characteristic_changed(&self, _peer: &PeerId) -> bool {
        self.notifies.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn cancel_connection(&self, peer: &PeerId) {
        self.cancelled.lock().push(peer.clone());
    }
}

/// Platform double that delivers every write to another engine, as if the
/// characteristic write crossed the air
pub struct LoopbackPlatform {
    local_address: PeerId,
    remote: OnceLock<Arc<TransportEngine>>,
}

impl LoopbackPlatform {
    pub fn new(local_address: &str) -> Arc<Self> {
        Arc::new(Self {
            local_address: PeerId::new(local_address),
            remote: OnceLock::new(),
        })
    }

    pub fn attach(&self, remote: Arc<TransportEngine>) {
        let _ = self.remote.set(remote);
    }
}

impl GattPlatform for LoopbackPlatform {
    fn write_characteristic(&self, _peer: &PeerId, value: &[u8]) -> bool {
        match self.remote.get() {
            Some(remote) => {
                let _ = remote.on_frame_received(&self.local_address, value);
                true
            }
            None => false,
        }
    }

    fn notify_characteristic_changed(&self, _peer: &PeerId) -> bool {
        true
    }

    fn cancel_connection(&self, _peer: &PeerId) {}
}

/// Sink that keeps every event for inspection
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<BridgeEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<BridgeEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn messages(&self) -> Vec<(Option<u8>, Vec<u8>)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                BridgeEvent::Message {
                    stream_id, payload, ..
                } => Some((*stream_id, payload.clone())),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: BridgeEvent) {
        self.events.lock().push(event);
    }
}
