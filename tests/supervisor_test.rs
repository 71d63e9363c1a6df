//! Supervisor behaviour: single active session, sends, discovery.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use common::{next_event, next_peer, wait_until, MockConnector, MockDiscovery, Mode};
use spp_link::bluetooth::{
    Delimiter, DeviceRecord, DiscoveryEvent, LinkEvent, SessionConfig, SessionError,
    SessionState, SessionSupervisor,
};

const ADDRESS: &str = "00:11:22:33:44:55";

fn device(address: &str, name: &str) -> DeviceRecord {
    DeviceRecord::new(address, Some(name.to_string()))
}

#[tokio::test]
async fn test_second_connect_while_connecting_is_rejected() {
    let (connector, gate, mut peers) = MockConnector::gated(Mode::Duplex);
    let (supervisor, mut events) = SessionSupervisor::new(connector.clone(), SessionConfig::default());

    let first = supervisor.connect(ADDRESS).unwrap();
    assert_eq!(supervisor.state(), SessionState::Connecting);

    let second = supervisor.connect(ADDRESS);
    assert!(matches!(second, Err(SessionError::AlreadyBusy)));
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::ConnectFailed {
            address: ADDRESS.to_string(),
            error: SessionError::AlreadyBusy,
        }
    );

    gate.notify_one();
    assert_eq!(first.await.unwrap(), Ok(()));
    assert_eq!(supervisor.state(), SessionState::Connected);
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::Connected {
            address: ADDRESS.to_string(),
        }
    );
    assert_eq!(connector.attempts(), 1);

    // The first session is fully usable.
    let mut peer = next_peer(&mut peers).await;
    peer.write_all(b"ping\r\n").await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::MessageReceived(b"ping\r\n".to_vec())
    );

    supervisor.shutdown().await;
}

#[tokio::test]
async fn test_connect_while_connected_is_rejected() {
    let (connector, _peers) = MockConnector::new(Mode::Duplex);
    let (supervisor, _events) = SessionSupervisor::new(connector, SessionConfig::default());

    supervisor.connect(ADDRESS).unwrap().await.unwrap().unwrap();
    assert!(matches!(
        supervisor.connect("66:77:88:99:AA:BB"),
        Err(SessionError::AlreadyBusy)
    ));
    assert_eq!(supervisor.current_address().as_deref(), Some(ADDRESS));

    supervisor.cancel().await;
}

#[tokio::test]
async fn test_send_without_session() {
    let (connector, _peers) = MockConnector::new(Mode::Duplex);
    let (supervisor, mut events) = SessionSupervisor::new(connector, SessionConfig::default());

    assert_eq!(supervisor.send(b"hi").await, Err(SessionError::NotConnected));
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::SendFailed(SessionError::NotConnected)
    );
}

#[tokio::test]
async fn test_send_reports_bytes_sent() {
    let (connector, mut peers) = MockConnector::new(Mode::Duplex);
    let (supervisor, mut events) = SessionSupervisor::new(connector, SessionConfig::default());

    supervisor.connect(ADDRESS).unwrap().await.unwrap().unwrap();
    next_event(&mut events).await;
    let mut peer = next_peer(&mut peers).await;

    supervisor.send(b"one\n").await.unwrap();
    supervisor.send(b"two\n").await.unwrap();
    assert_eq!(next_event(&mut events).await, LinkEvent::BytesSent(b"one\n".to_vec()));
    assert_eq!(next_event(&mut events).await, LinkEvent::BytesSent(b"two\n".to_vec()));

    let mut buf = [0u8; 8];
    peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"one\ntwo\n");

    supervisor.cancel().await;
}

#[tokio::test]
async fn test_cancel_then_reconnect() {
    let (connector, mut peers) = MockConnector::new(Mode::Duplex);
    let (supervisor, mut events) = SessionSupervisor::new(connector.clone(), SessionConfig::default());

    supervisor.connect(ADDRESS).unwrap().await.unwrap().unwrap();
    let mut peer = next_peer(&mut peers).await;
    supervisor.cancel().await;

    assert_eq!(supervisor.state(), SessionState::Idle);
    let mut buf = [0u8; 1];
    assert_eq!(peer.read(&mut buf).await.unwrap(), 0);

    assert!(matches!(next_event(&mut events).await, LinkEvent::Connected { .. }));
    assert!(matches!(next_event(&mut events).await, LinkEvent::Disconnected { .. }));

    supervisor.connect(ADDRESS).unwrap().await.unwrap().unwrap();
    assert_eq!(supervisor.state(), SessionState::Connected);
    assert_eq!(connector.attempts(), 2);

    supervisor.cancel().await;
}

#[tokio::test]
async fn test_failed_session_does_not_block_new_attempt() {
    let (connector, _peers) =
        MockConnector::new(Mode::Fail(SessionError::SocketCreationFailed("no radio".to_string())));
    let (supervisor, mut events) = SessionSupervisor::new(connector.clone(), SessionConfig::default());

    let result = supervisor.connect(ADDRESS).unwrap().await.unwrap();
    assert_eq!(result, Err(SessionError::SocketCreationFailed("no radio".to_string())));
    assert_eq!(supervisor.state(), SessionState::Failed);
    assert!(matches!(
        next_event(&mut events).await,
        LinkEvent::ConnectFailed { .. }
    ));

    assert!(supervisor.connect(ADDRESS).is_ok());
    wait_until(|| connector.attempts() == 2).await;
}

#[tokio::test]
async fn test_delimiter_locked_while_active() {
    let (connector, mut peers) = MockConnector::new(Mode::Duplex);
    let (supervisor, mut events) = SessionSupervisor::new(connector, SessionConfig::default());
    let pipe = Delimiter::new(*b"|").unwrap();

    supervisor.connect(ADDRESS).unwrap().await.unwrap().unwrap();
    assert_eq!(
        supervisor.set_delimiter(pipe.clone()),
        Err(SessionError::AlreadyBusy)
    );
    supervisor.cancel().await;
    let _ = next_peer(&mut peers).await;

    supervisor.set_delimiter(pipe).unwrap();
    assert_eq!(supervisor.config().delimiter.as_bytes(), b"|");

    supervisor.connect(ADDRESS).unwrap().await.unwrap().unwrap();
    let mut peer = next_peer(&mut peers).await;
    peer.write_all(b"x|y\r\n|").await.unwrap();

    let mut messages = Vec::new();
    while messages.len() < 2 {
        if let LinkEvent::MessageReceived(message) = next_event(&mut events).await {
            messages.push(message);
        }
    }
    assert_eq!(messages, vec![b"x|".to_vec(), b"y\r\n|".to_vec()]);

    supervisor.cancel().await;
}

#[tokio::test]
async fn test_discovery_deduplicates_by_address() {
    let discovery = MockDiscovery::new(vec![
        DiscoveryEvent::DeviceFound(device("AA:AA:AA:AA:AA:AA", "HC-05")),
        DiscoveryEvent::DeviceFound(device("AA:AA:AA:AA:AA:AA", "HC-05")),
        DiscoveryEvent::DeviceFound(device("BB:BB:BB:BB:BB:BB", "Printer")),
        DiscoveryEvent::Finished,
    ]);
    let (connector, _peers) = MockConnector::new(Mode::Duplex);
    let (supervisor, mut events) = SessionSupervisor::new(connector, SessionConfig::default());
    let supervisor = supervisor.with_discovery(discovery.clone());

    supervisor.start_discovery().await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::DeviceFound(device("AA:AA:AA:AA:AA:AA", "HC-05"))
    );
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::DeviceFound(device("BB:BB:BB:BB:BB:BB", "Printer"))
    );
    assert_eq!(next_event(&mut events).await, LinkEvent::DiscoveryFinished);
    assert_eq!(supervisor.discovered_devices().len(), 2);

    // A new run reports the same devices again.
    supervisor.start_discovery().await.unwrap();
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::DeviceFound(device("AA:AA:AA:AA:AA:AA", "HC-05"))
    );
    assert_eq!(discovery.starts.load(Ordering::SeqCst), 2);

    supervisor.cancel_discovery().await.unwrap();
    assert_eq!(discovery.cancels.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_discovery_reports_finished_once() {
    let discovery = MockDiscovery::until_cancelled(vec![DiscoveryEvent::DeviceFound(device(
        "AA:AA:AA:AA:AA:AA",
        "HC-05",
    ))]);
    let (connector, _peers) = MockConnector::new(Mode::Duplex);
    let (supervisor, mut events) = SessionSupervisor::new(connector, SessionConfig::default());
    let supervisor = supervisor.with_discovery(discovery.clone());

    supervisor.start_discovery().await.unwrap();
    assert!(matches!(next_event(&mut events).await, LinkEvent::DeviceFound(_)));

    supervisor.cancel_discovery().await.unwrap();
    assert_eq!(next_event(&mut events).await, LinkEvent::DiscoveryFinished);
    assert_eq!(discovery.cancels.load(Ordering::SeqCst), 1);

    // The backend's own Finished for the cancelled run is not repeated.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());

    // Cancelling with nothing running stays quiet.
    supervisor.cancel_discovery().await.unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_discovery_requires_backend() {
    let (connector, _peers) = MockConnector::new(Mode::Duplex);
    let (supervisor, _events) = SessionSupervisor::new(connector, SessionConfig::default());

    assert!(supervisor.start_discovery().await.is_err());
    assert!(supervisor.discovered_devices().is_empty());
}
