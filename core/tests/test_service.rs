// Integration tests for the transport service task
//
// Platform callbacks go in through the handle's event channel, bridge events
// come out of the channel sink, and application sends come back as anyhow
// errors carrying the typed TransportError.

mod common;

use adhoc_transport_core::{
    channel_sink, start_service, BridgeEvent, GattPlatform, PeerId, PlatformEvent,
    TransportConfig, TransportEngine, TransportError,
};
use common::RecordingPlatform;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{timeout, Duration};

fn peer() -> PeerId {
    PeerId::new("52:54:00:12:34:56")
}

fn setup(
    config: TransportConfig,
) -> (
    adhoc_transport_core::ServiceHandle,
    Arc<RecordingPlatform>,
    UnboundedReceiver<BridgeEvent>,
) {
    let platform = RecordingPlatform::new();
    let (sink, events) = channel_sink();
    let engine = TransportEngine::new(config, platform.clone(), Arc::new(sink))
        .expect("Failed to create engine");
    (start_service(Arc::new(engine)), platform, events)
}

async fn next_event(events: &mut UnboundedReceiver<BridgeEvent>) -> BridgeEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("Timed out waiting for event")
        .expect("Event channel closed")
}

#[tokio::test]
async fn test_connect_send_and_receive() {
    let (handle, platform, mut events) = setup(TransportConfig::for_testing());

    handle
        .platform_event(PlatformEvent::ConnectionStateChanged {
            peer: peer(),
            connected: true,
        })
        .expect("Event");
    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::Connection {
            peer: peer(),
            connected: true
        }
    );

    handle
        .platform_event(PlatformEvent::MtuChanged { peer: peer(), mtu: 23 })
        .expect("Event");
    handle
        .send(peer(), b"hello over gatt".to_vec())
        .await
        .expect("Send");
    assert_eq!(platform.frame_lengths(), vec![16]);

    for value in [vec![1, b'p', b'i'], vec![0, b'n', b'g']] {
        handle
            .platform_event(PlatformEvent::CharacteristicWriteRequest {
                peer: peer(),
                value,
            })
            .expect("Event");
    }
    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::Message {
            peer: peer(),
            stream_id: None,
            payload: b"ping".to_vec()
        }
    );

    assert_eq!(handle.connected_peers().await.expect("Peers"), vec![peer()]);
    handle.shutdown().await.expect("Shutdown");
}

#[tokio::test]
async fn test_send_error_is_typed() {
    let (handle, _, _events) = setup(TransportConfig::for_testing());

    let err = handle
        .send(peer(), b"nobody home".to_vec())
        .await
        .expect_err("Send should fail");

    assert_eq!(
        err.downcast_ref::<TransportError>(),
        Some(&TransportError::NotConnected)
    );

    let err = handle
        .send_on_stream(peer(), 1, b"x".to_vec())
        .await
        .expect_err("Streams are disabled");
    assert_eq!(
        err.downcast_ref::<TransportError>(),
        Some(&TransportError::StreamsDisabled)
    );
}

#[tokio::test]
async fn test_discovery_cycle_events() {
    let (handle, _, mut events) = setup(TransportConfig::for_testing());

    handle
        .platform_event(PlatformEvent::DiscoveryStarted)
        .expect("Event");
    for name in ["a", "b", "c"] {
        handle
            .platform_event(PlatformEvent::PeerDiscovered {
                peer: peer(),
                name: Some(name.to_string()),
            })
            .expect("Event");
    }
    handle
        .platform_event(PlatformEvent::DiscoveryFinished)
        .expect("Event");

    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::PeerFound {
            peer: peer(),
            name: Some("a".to_string())
        }
    );
    match next_event(&mut events).await {
        BridgeEvent::Discovery { peers } => {
            assert_eq!(peers.len(), 1);
            assert_eq!(peers[0].peer, peer());
        }
        other => panic!("Unexpected event: {}", other),
    }
    assert_eq!(handle.discovered_peers().await.expect("Discovered").len(), 1);
}

#[tokio::test]
async fn test_bond_and_cancel() {
    let (handle, platform, mut events) = setup(TransportConfig::for_testing());

    handle
        .platform_event(PlatformEvent::ConnectionStateChanged {
            peer: peer(),
            connected: true,
        })
        .expect("Event");
    handle
        .platform_event(PlatformEvent::BondStateChanged {
            peer: peer(),
            bonded: true,
        })
        .expect("Event");

    assert!(matches!(
        next_event(&mut events).await,
        BridgeEvent::Connection { connected: true, .. }
    ));
    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::Bond {
            peer: peer(),
            bonded: true
        }
    );

    handle.cancel_connection(peer()).await.expect("Cancel");
    assert!(matches!(
        next_event(&mut events).await,
        BridgeEvent::Connection { connected: false, .. }
    ));
    assert_eq!(platform.cancelled(), vec![peer()]);
    assert!(handle.connected_peers().await.expect("Peers").is_empty());
}

#[tokio::test]
async fn test_shutdown_disconnects_and_stops() {
    let (handle, _, mut events) = setup(TransportConfig::for_testing());

    handle
        .platform_event(PlatformEvent::ConnectionStateChanged {
            peer: peer(),
            connected: true,
        })
        .expect("Event");
    next_event(&mut events).await;

    handle.shutdown().await.expect("Shutdown");
    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::Connection {
            peer: peer(),
            connected: false
        }
    );

    // Give the task a moment to drop its receivers
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handle.connected_peers().await.is_err());
}

struct PanickingPlatform;

impl GattPlatform for PanickingPlatform {
    fn write_characteristic(&self, _peer: &PeerId, _value: &[u8]) -> bool {
        panic!("host stack crashed");
    }

    fn notify_characteristic_changed(&self, _peer: &PeerId) -> bool {
        true
    }

    fn cancel_connection(&self, _peer: &PeerId) {}
}

#[tokio::test]
async fn test_crashed_send_is_not_reported_as_disconnect() {
    let (sink, _events) = channel_sink();
    let engine = TransportEngine::new(
        TransportConfig::for_testing(),
        Arc::new(PanickingPlatform),
        Arc::new(sink),
    )
    .expect("Failed to create engine");
    let handle = start_service(Arc::new(engine));

    handle
        .platform_event(PlatformEvent::ConnectionStateChanged {
            peer: peer(),
            connected: true,
        })
        .expect("Event");

    let err = handle
        .send(peer(), b"boom".to_vec())
        .await
        .expect_err("Send should fail");

    assert!(err.downcast_ref::<TransportError>().is_none());
    assert!(err.to_string().contains("Send task failed"));

    // The service keeps running after a crashed send
    assert_eq!(handle.connected_peers().await.expect("Peers"), vec![peer()]);
}
