//! Mock platform collaborators shared by the integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{mpsc, Notify};

use spp_link::bluetooth::{
    BoxedStream, Connector, DeviceDiscovery, DiscoveryEvent, LinkEvent, SessionError,
};

/// What the mock connector hands out.
#[derive(Clone)]
pub enum Mode {
    /// An in-memory pipe; the far end is published on `peers`.
    Duplex,
    /// The handshake fails.
    Fail(SessionError),
    /// A stream that yields `data` and then a read error.
    Broken(Vec<u8>),
}

pub struct MockConnector {
    mode: Mode,
    gate: Option<Arc<Notify>>,
    attempts: AtomicUsize,
    peers: mpsc::UnboundedSender<DuplexStream>,
}

impl MockConnector {
    pub fn new(mode: Mode) -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            mode,
            gate: None,
            attempts: AtomicUsize::new(0),
            peers,
        });
        (connector, peer_rx)
    }

    /// Handshakes block until the returned `Notify` is signalled.
    pub fn gated(mode: Mode) -> (Arc<Self>, Arc<Notify>, mpsc::UnboundedReceiver<DuplexStream>) {
        let gate = Arc::new(Notify::new());
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            mode,
            gate: Some(gate.clone()),
            attempts: AtomicUsize::new(0),
            peers,
        });
        (connector, gate, peer_rx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self, _address: &str) -> Result<BoxedStream, SessionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.mode {
            Mode::Duplex => {
                let (ours, theirs) = tokio::io::duplex(256);
                let _ = self.peers.send(theirs);
                Ok(Box::new(ours))
            }
            Mode::Fail(error) => Err(error.clone()),
            Mode::Broken(data) => Ok(Box::new(BrokenStream {
                data: Some(data.clone()),
            })),
        }
    }
}

/// Yields its data once, then fails every read. Writes are swallowed.
pub struct BrokenStream {
    data: Option<Vec<u8>>,
}

impl AsyncRead for BrokenStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.data.take() {
            Some(data) => {
                buf.put_slice(&data);
                Poll::Ready(Ok(()))
            }
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
        }
    }
}

impl AsyncWrite for BrokenStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Discovery that replays a fixed script on every run.
pub struct MockDiscovery {
    script: Vec<DiscoveryEvent>,
    /// Sender of a run that only ends on `cancel()`.
    running: Option<Mutex<Option<mpsc::Sender<DiscoveryEvent>>>>,
    pub starts: AtomicUsize,
    pub cancels: AtomicUsize,
}

impl MockDiscovery {
    pub fn new(script: Vec<DiscoveryEvent>) -> Arc<Self> {
        Arc::new(Self {
            script,
            running: None,
            starts: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        })
    }

    /// Runs stay open after the script and report `Finished` when cancelled,
    /// like a BlueZ inquiry.
    pub fn until_cancelled(script: Vec<DiscoveryEvent>) -> Arc<Self> {
        Arc::new(Self {
            script,
            running: Some(Mutex::new(None)),
            starts: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DeviceDiscovery for MockDiscovery {
    async fn start(&self) -> Result<mpsc::Receiver<DiscoveryEvent>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.script.len() + 1);
        for event in &self.script {
            tx.send(event.clone()).await?;
        }
        if let Some(running) = &self.running {
            *running.lock() = Some(tx);
        }
        Ok(rx)
    }

    async fn cancel(&self) -> Result<()> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        let sender = self.running.as_ref().and_then(|running| running.lock().take());
        if let Some(tx) = sender {
            let _ = tx.try_send(DiscoveryEvent::Finished);
        }
        Ok(())
    }
}

/// Next event, failing the test after a second of silence.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Next peer stream handed out by a connector.
pub async fn next_peer(peers: &mut mpsc::UnboundedReceiver<DuplexStream>) -> DuplexStream {
    tokio::time::timeout(Duration::from_secs(1), peers.recv())
        .await
        .expect("timed out waiting for connection")
        .expect("connector dropped")
}

/// Yield until `check` holds, failing after a second.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never became true");
}
