// Transport service: the running BLE transport node
//
// Owns a TransportEngine and a DiscoveryDeduplicator behind a tokio task:
// - Platform callbacks arrive on an unbounded channel (callers are host threads)
// - Application commands arrive on a bounded channel with one-shot replies
// - Sends run on the blocking pool; retry backoff and burst pacing sleep there

use super::abstraction::{BridgeEvent, DiscoveredPeer, PeerId, PlatformEvent};
use super::ble::discovery::DiscoveryDeduplicator;
use super::ble::engine::TransportEngine;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Commands that can be sent to the service task
#[derive(Debug)]
pub enum ServiceCommand {
    /// Send a message to a connected peer. Engine failures arrive as a
    /// wrapped [`TransportError`](super::ble::engine::TransportError).
    Send {
        peer: PeerId,
        stream_id: Option<u8>,
        message: Vec<u8>,
        reply: mpsc::Sender<Result<()>>,
    },
    /// Get connected peers
    GetPeers { reply: mpsc::Sender<Vec<PeerId>> },
    /// Get the peers seen in the current discovery cycle
    GetDiscovered {
        reply: mpsc::Sender<Vec<DiscoveredPeer>>,
    },
    /// Drop a peer's link
    CancelConnection {
        peer: PeerId,
        reply: mpsc::Sender<()>,
    },
    /// Stop the service, disconnecting every peer
    Shutdown,
}

/// Route one platform callback into the engine and the discovery state.
///
/// Usable without the service task by hosts that already serialize their
/// callbacks.
pub fn dispatch_platform_event(
    engine: &TransportEngine,
    discovery: &DiscoveryDeduplicator,
    event: PlatformEvent,
) {
    match event {
        PlatformEvent::ConnectionStateChanged { peer, connected } => {
            engine.on_connection_state_changed(&peer, connected);
        }
        PlatformEvent::ConnectionPending { peer } => engine.on_connection_pending(&peer),
        PlatformEvent::MtuChanged { peer, mtu } => engine.on_mtu_changed(&peer, mtu),
        PlatformEvent::CharacteristicWriteRequest { peer, value } => {
            if let Err(e) = engine.on_frame_received(&peer, &value) {
                debug!("Inbound frame from {} rejected: {}", peer, e);
            }
        }
        PlatformEvent::BondStateChanged { peer, bonded } => {
            engine.on_bond_state_changed(&peer, bonded);
        }
        PlatformEvent::DiscoveryStarted => {
            discovery.on_cycle_started();
            info!("Discovery cycle {} started", discovery.cycle_number());
        }
        PlatformEvent::PeerDiscovered { peer, name } => {
            if discovery.on_peer_seen(&peer, name.clone()) {
                engine.sink().emit(BridgeEvent::PeerFound { peer, name });
            }
        }
        PlatformEvent::DiscoveryFinished => {
            let peers = discovery.on_cycle_finished();
            engine.sink().emit(BridgeEvent::Discovery { peers });
        }
    }
}

/// Handle to communicate with the running service task
#[derive(Clone)]
pub struct ServiceHandle {
    command_tx: mpsc::Sender<ServiceCommand>,
    event_tx: mpsc::UnboundedSender<PlatformEvent>,
}

impl ServiceHandle {
    /// Forward a platform callback. Safe to call from any thread.
    pub fn platform_event(&self, event: PlatformEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|_| anyhow::anyhow!("Transport service not running"))
    }

    /// Send a message on the default stream
    pub async fn send(&self, peer: PeerId, message: Vec<u8>) -> Result<()> {
        self.send_with(peer, None, message).await
    }

    /// Send a message on a specific stream
    pub async fn send_on_stream(&self, peer: PeerId, stream_id: u8, message: Vec<u8>) -> Result<()> {
        self.send_with(peer, Some(stream_id), message).await
    }

    async fn send_with(&self, peer: PeerId, stream_id: Option<u8>, message: Vec<u8>) -> Result<()> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(ServiceCommand::Send {
                peer,
                stream_id,
                message,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Transport service not running"))?;

        reply_rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No reply from transport service"))??;
        Ok(())
    }

    /// Get connected peers
    pub async fn connected_peers(&self) -> Result<Vec<PeerId>> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(ServiceCommand::GetPeers { reply: reply_tx })
            .await
            .map_err(|_| anyhow::anyhow!("Transport service not running"))?;

        reply_rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No reply from transport service"))
    }

    /// Get the peers seen in the current discovery cycle
    pub async fn discovered_peers(&self) -> Result<Vec<DiscoveredPeer>> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(ServiceCommand::GetDiscovered { reply: reply_tx })
            .await
            .map_err(|_| anyhow::anyhow!("Transport service not running"))?;

        reply_rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No reply from transport service"))
    }

    /// Drop the link to a peer
    pub async fn cancel_connection(&self, peer: PeerId) -> Result<()> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.command_tx
            .send(ServiceCommand::CancelConnection {
                peer,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Transport service not running"))?;

        reply_rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No reply from transport service"))
    }

    /// Shut down the service
    pub async fn shutdown(&self) -> Result<()> {
        self.command_tx
            .send(ServiceCommand::Shutdown)
            .await
            .map_err(|_| anyhow::anyhow!("Transport service not running"))
    }
}

/// Start the service task, returning a handle for communication.
///
/// Must be called from within a tokio runtime. The task stops on
/// [`ServiceHandle::shutdown`] or once every handle is dropped; either way
/// every connected peer is reported as disconnected.
pub fn start_service(engine: Arc<TransportEngine>) -> ServiceHandle {
    let (command_tx, mut command_rx) = mpsc::channel::<ServiceCommand>(256);
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PlatformEvent>();
    let handle = ServiceHandle {
        command_tx,
        event_tx,
    };

    let discovery = DiscoveryDeduplicator::new();

    tokio::spawn(async move {
        info!("Transport service started");
        loop {
            tokio::select! {
                biased;

                Some(event) = event_rx.recv() => {
                    debug!("Platform event: {}", event);
                    dispatch_platform_event(&engine, &discovery, event);
                }

                command = command_rx.recv() => {
                    let Some(command) = command else {
                        debug!("All service handles dropped");
                        break;
                    };
                    match command {
                        ServiceCommand::Send { peer, stream_id, message, reply } => {
                            let engine = Arc::clone(&engine);
                            tokio::spawn(async move {
                                let result = tokio::task::spawn_blocking(move || match stream_id {
                                    Some(stream_id) => engine.send_on_stream(&peer, stream_id, &message),
                                    None => engine.send(&peer, &message),
                                })
                                .await;

                                let result = match result {
                                    Ok(result) => result.map_err(anyhow::Error::from),
                                    Err(e) => {
                                        warn!("Send task failed: {}", e);
                                        Err(anyhow::anyhow!("Send task failed: {}", e))
                                    }
                                };
                                let _ = reply.send(result).await;
                            });
                        }
                        ServiceCommand::GetPeers { reply } => {
                            let _ = reply.send(engine.connected_peers()).await;
                        }
                        ServiceCommand::GetDiscovered { reply } => {
                            let _ = reply.send(discovery.peers()).await;
                        }
                        ServiceCommand::CancelConnection { peer, reply } => {
                            engine.cancel_connection(&peer);
                            let _ = reply.send(()).await;
                        }
                        ServiceCommand::Shutdown => {
                            info!("Transport service shutting down");
                            break;
                        }
                    }
                }
            }
        }
        engine.shutdown();
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::transport::ble::gatt::MockGattPlatform;
    use crate::transport::sink::channel_sink;

    fn engine() -> (TransportEngine, mpsc::UnboundedReceiver<BridgeEvent>) {
        let (tx, rx) = channel_sink();
        let engine = TransportEngine::new(
            TransportConfig::for_testing(),
            Arc::new(MockGattPlatform::new()),
            Arc::new(tx),
        )
        .expect("Engine");
        (engine, rx)
    }

    #[test]
    fn test_dispatch_discovery_cycle() {
        let (engine, mut rx) = engine();
        let discovery = DiscoveryDeduplicator::new();
        let a = PeerId::new("01:02:03:04:05:06");

        dispatch_platform_event(&engine, &discovery, PlatformEvent::DiscoveryStarted);
        for _ in 0..3 {
            dispatch_platform_event(
                &engine,
                &discovery,
                PlatformEvent::PeerDiscovered {
                    peer: a.clone(),
                    name: Some("node".to_string()),
                },
            );
        }
        dispatch_platform_event(&engine, &discovery, PlatformEvent::DiscoveryFinished);

        assert_eq!(
            rx.try_recv().expect("Found"),
            BridgeEvent::PeerFound {
                peer: a.clone(),
                name: Some("node".to_string())
            }
        );
        match rx.try_recv().expect("Discovery") {
            BridgeEvent::Discovery { peers } => {
                assert_eq!(peers.len(), 1);
                assert_eq!(peers[0].peer, a);
            }
            other => panic!("Unexpected event {}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dispatch_inbound_frames() {
        let (engine, mut rx) = engine();
        let discovery = DiscoveryDeduplicator::new();
        let peer = PeerId::new("01:02:03:04:05:06");

        for event in [
            PlatformEvent::ConnectionStateChanged {
                peer: peer.clone(),
                connected: true,
            },
            PlatformEvent::CharacteristicWriteRequest {
                peer: peer.clone(),
                value: vec![],
            },
            PlatformEvent::CharacteristicWriteRequest {
                peer: peer.clone(),
                value: vec![0, b'o', b'k'],
            },
        ] {
            dispatch_platform_event(&engine, &discovery, event);
        }

        assert!(matches!(
            rx.try_recv(),
            Ok(BridgeEvent::Connection { connected: true, .. })
        ));
        assert_eq!(
            rx.try_recv().expect("Message"),
            BridgeEvent::Message {
                peer,
                stream_id: None,
                payload: b"ok".to_vec()
            }
        );
    }
}
