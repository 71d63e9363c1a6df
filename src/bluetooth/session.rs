// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A single serial link session.
//!
//! A session walks `Idle → Connecting → Connected → {Closed, Failed}` exactly
//! once. Reconnecting means building a new session.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::delimiter::Delimiter;
use super::error::SessionError;
use super::reassembler::{StreamEnd, StreamReassembler, DEFAULT_READ_CHUNK_SIZE};
use super::transport::{BoxedStream, Connector, DeviceRecord, DEFAULT_CONNECT_TIMEOUT};

/// Events delivered to the application, in order, over one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Discovery reported a device not seen before in this run.
    DeviceFound(DeviceRecord),
    /// Discovery run ended.
    DiscoveryFinished,
    /// Handshake succeeded.
    Connected { address: String },
    /// Connect request failed or was rejected.
    ConnectFailed { address: String, error: SessionError },
    /// A complete delimiter-terminated message arrived.
    MessageReceived(Vec<u8>),
    /// Bytes were written to the link.
    BytesSent(Vec<u8>),
    /// A send request failed.
    SendFailed(SessionError),
    /// The link closed (locally or by the peer).
    Disconnected { address: String },
    /// The link broke while receiving.
    ConnectionLost { address: String, error: SessionError },
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Closed,
    Failed,
}

impl SessionState {
    /// Connecting or connected.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Connected)
    }

    /// Closed or failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// Per-session settings, fixed when the session is created.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub delimiter: Delimiter,
    pub read_chunk_size: usize,
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::default(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// One connection attempt and its lifetime.
pub struct ConnectionSession {
    address: String,
    config: SessionConfig,
    state: Mutex<SessionState>,
    writer: tokio::sync::Mutex<Option<WriteHalf<BoxedStream>>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl ConnectionSession {
    /// Create an idle session for `address`.
    pub fn new(
        address: impl Into<String>,
        config: SessionConfig,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            address: address.into(),
            config,
            state: Mutex::new(SessionState::Idle),
            writer: tokio::sync::Mutex::new(None),
            receiver: Mutex::new(None),
            cancel: CancellationToken::new(),
            events,
        })
    }

    /// Target address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Connecting or connected.
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Connect and start receiving.
    ///
    /// Returns once the handshake has finished; messages then arrive as
    /// [`LinkEvent::MessageReceived`].
    pub async fn connect(self: &Arc<Self>, connector: &dyn Connector) -> Result<(), SessionError> {
        self.begin_connect()?;
        self.handshake(connector).await
    }

    /// Move `Idle → Connecting`.
    pub(crate) fn begin_connect(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        match *state {
            SessionState::Idle => {
                *state = SessionState::Connecting;
                Ok(())
            }
            SessionState::Connecting | SessionState::Connected => Err(SessionError::AlreadyBusy),
            SessionState::Closed | SessionState::Failed => Err(SessionError::Terminated),
        }
    }

    /// Run the handshake of a session already in `Connecting`.
    pub(crate) async fn handshake(self: &Arc<Self>, connector: &dyn Connector) -> Result<(), SessionError> {
        info!("Connecting to {} via {}", self.address, connector.name());

        let attempt = tokio::time::timeout(self.config.connect_timeout, connector.connect(&self.address));
        let result = tokio::select! {
            biased;

            () = self.cancel.cancelled() => Err(SessionError::Cancelled),

            result = attempt => match result {
                Ok(result) => result,
                Err(_) => Err(SessionError::ConnectFailed("timed out".to_string())),
            },
        };

        let stream = match result {
            Ok(stream) => stream,
            Err(SessionError::Cancelled) => {
                info!("Connect to {} cancelled", self.address);
                return Err(SessionError::Cancelled);
            }
            Err(e) => {
                if self.transition(SessionState::Connecting, SessionState::Failed) {
                    error!("Connect to {} failed: {}", self.address, e);
                    self.emit(LinkEvent::ConnectFailed {
                        address: self.address.clone(),
                        error: e.clone(),
                    });
                    return Err(e);
                }
                // Lost the race against close().
                return Err(SessionError::Cancelled);
            }
        };

        let (reader, writer) = tokio::io::split(stream);
        *self.writer.lock().await = Some(writer);

        // close() must observe either Connecting or a stored receive task,
        // so the state lock is held until the handle is in place.
        {
            let mut state = self.state.lock();
            if *state == SessionState::Connecting {
                *state = SessionState::Connected;
                info!("Connected to {}", self.address);
                self.emit(LinkEvent::Connected {
                    address: self.address.clone(),
                });

                let session = Arc::clone(self);
                let handle = tokio::spawn(async move { session.receive_loop(reader).await });
                *self.receiver.lock() = Some(handle);
                return Ok(());
            }
        }

        info!("Connect to {} cancelled after handshake", self.address);
        self.writer.lock().await.take();
        Err(SessionError::Cancelled)
    }

    async fn receive_loop(self: Arc<Self>, mut reader: ReadHalf<BoxedStream>) {
        debug!("Receive loop started for {}", self.address);

        let mut reassembler =
            StreamReassembler::with_chunk_size(self.config.delimiter.clone(), self.config.read_chunk_size);
        let events = self.events.clone();
        let outcome = reassembler
            .run(&mut reader, &self.cancel, |message| {
                let _ = events.send(LinkEvent::MessageReceived(message));
            })
            .await;
        drop(reader);

        match outcome {
            Ok(StreamEnd::Cancelled) => {
                debug!("Receive loop for {} cancelled", self.address);
            }
            Ok(StreamEnd::Eof { discarded }) => {
                if discarded > 0 {
                    warn!("Dropped {} undelimited bytes at end of stream", discarded);
                }
                if self.transition(SessionState::Connected, SessionState::Closed) {
                    info!("Connection to {} closed by remote", self.address);
                    self.writer.lock().await.take();
                    self.emit(LinkEvent::Disconnected {
                        address: self.address.clone(),
                    });
                }
            }
            Err(e) => {
                if self.transition(SessionState::Connected, SessionState::Failed) {
                    error!("Connection to {} lost: {}", self.address, e);
                    self.writer.lock().await.take();
                    self.emit(LinkEvent::ConnectionLost {
                        address: self.address.clone(),
                        error: e,
                    });
                }
            }
        }
    }

    /// Write raw bytes to the link.
    ///
    /// Concurrent sends are serialized; each one is written completely before
    /// the next starts.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), SessionError> {
        if self.state() != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SessionError::NotConnected)?;

        writer
            .write_all(bytes)
            .await
            .map_err(|e| SessionError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| SessionError::WriteFailed(e.to_string()))?;

        debug!("Sent {} bytes to {}", bytes.len(), self.address);
        Ok(())
    }

    /// Close the session and release the stream.
    ///
    /// Returns after the receive loop has stopped. Closing twice is a no-op.
    pub async fn close(&self) {
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            if !previous.is_terminal() {
                *state = SessionState::Closed;
            }
            previous
        };
        self.cancel.cancel();

        if previous.is_terminal() {
            return;
        }

        self.writer.lock().await.take();

        let receiver = self.receiver.lock().take();
        if let Some(handle) = receiver {
            if let Err(e) = handle.await {
                warn!("Receive loop for {} ended abnormally: {}", self.address, e);
            }
        }

        info!("Session to {} closed", self.address);
        if previous.is_active() {
            self.emit(LinkEvent::Disconnected {
                address: self.address.clone(),
            });
        }
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut state = self.state.lock();
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    fn emit(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
