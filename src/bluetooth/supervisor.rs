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

//! Session supervisor.
//!
//! Owns at most one live [`ConnectionSession`] and funnels every outcome into
//! a single ordered event channel.

use anyhow::{anyhow, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::delimiter::Delimiter;
use super::discovery::DiscoveryTracker;
use super::error::SessionError;
use super::session::{ConnectionSession, LinkEvent, SessionConfig, SessionState};
use super::transport::{Connector, DeviceDiscovery, DeviceRecord, DiscoveryEvent};

/// Front door for connect/send/cancel and discovery requests.
pub struct SessionSupervisor {
    connector: Arc<dyn Connector>,
    discovery: Option<Arc<dyn DeviceDiscovery>>,
    config: RwLock<SessionConfig>,
    current: Mutex<Option<Arc<ConnectionSession>>>,
    tracker: Arc<Mutex<DiscoveryTracker>>,
    discovery_task: Mutex<Option<JoinHandle<()>>>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl SessionSupervisor {
    /// Create a supervisor and the receiver for its events.
    pub fn new(
        connector: Arc<dyn Connector>,
        config: SessionConfig,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            connector,
            discovery: None,
            config: RwLock::new(config),
            current: Mutex::new(None),
            tracker: Arc::new(Mutex::new(DiscoveryTracker::new())),
            discovery_task: Mutex::new(None),
            events,
        };
        (supervisor, event_rx)
    }

    /// Attach a discovery backend.
    pub fn with_discovery(mut self, discovery: Arc<dyn DeviceDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// State of the current session, `Idle` if there is none.
    pub fn state(&self) -> SessionState {
        self.current
            .lock()
            .as_ref()
            .map(|session| session.state())
            .unwrap_or(SessionState::Idle)
    }

    /// Address of the current session, if any.
    pub fn current_address(&self) -> Option<String> {
        self.current
            .lock()
            .as_ref()
            .map(|session| session.address().to_string())
    }

    /// Settings used for the next session.
    pub fn config(&self) -> SessionConfig {
        self.config.read().clone()
    }

    /// Change the delimiter for future sessions.
    ///
    /// Rejected with [`SessionError::AlreadyBusy`] while a session is active.
    pub fn set_delimiter(&self, delimiter: Delimiter) -> Result<(), SessionError> {
        let current = self.current.lock();
        if current.as_ref().is_some_and(|session| session.is_active()) {
            return Err(SessionError::AlreadyBusy);
        }
        debug!("Delimiter set to {:?}", delimiter);
        self.config.write().delimiter = delimiter;
        Ok(())
    }

    /// Start connecting to `address`.
    ///
    /// The handshake runs in the background; the returned handle resolves with
    /// its outcome, which is also reported through the event channel. A request
    /// made while another session is connecting or connected is rejected.
    pub fn connect(
        &self,
        address: &str,
    ) -> Result<JoinHandle<Result<(), SessionError>>, SessionError> {
        let session = {
            let mut current = self.current.lock();
            if current.as_ref().is_some_and(|session| session.is_active()) {
                warn!("Rejecting connect to {}: a session is already active", address);
                self.emit(LinkEvent::ConnectFailed {
                    address: address.to_string(),
                    error: SessionError::AlreadyBusy,
                });
                return Err(SessionError::AlreadyBusy);
            }

            let session = ConnectionSession::new(address, self.config(), self.events.clone());
            session.begin_connect()?;
            *current = Some(Arc::clone(&session));
            session
        };

        let connector = Arc::clone(&self.connector);
        Ok(tokio::spawn(async move {
            session.handshake(connector.as_ref()).await
        }))
    }

    /// Send raw bytes over the current session.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), SessionError> {
        let session = self.current.lock().clone();
        let result = match session {
            Some(session) => session.send(bytes).await,
            None => Err(SessionError::NotConnected),
        };

        match &result {
            Ok(()) => self.emit(LinkEvent::BytesSent(bytes.to_vec())),
            Err(e) => {
                warn!("Send failed: {}", e);
                self.emit(LinkEvent::SendFailed(e.clone()));
            }
        }
        result
    }

    /// Cancel the current session, connecting or connected.
    pub async fn cancel(&self) {
        let session = self.current.lock().take();
        if let Some(session) = session {
            info!("Cancelling session to {}", session.address());
            session.close().await;
        }
    }

    /// Start (or restart) device discovery.
    ///
    /// Restarting forgets the devices reported by the previous run.
    pub async fn start_discovery(&self) -> Result<()> {
        let discovery = self
            .discovery
            .clone()
            .ok_or_else(|| anyhow!("No discovery backend configured"))?;

        self.stop_forwarding().await;
        let generation = self.tracker.lock().begin();

        let mut notifications = discovery.start().await?;
        info!("Discovery started");

        let tracker = Arc::clone(&self.tracker);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                match notification {
                    DiscoveryEvent::DeviceFound(record) => {
                        if tracker.lock().observe(generation, &record) {
                            debug!("Found {} ({})", record.display_name(), record.address);
                            let _ = events.send(LinkEvent::DeviceFound(record));
                        }
                    }
                    DiscoveryEvent::Finished => break,
                }
            }
            info!("Discovery finished");
            let _ = events.send(LinkEvent::DiscoveryFinished);
        });
        *self.discovery_task.lock() = Some(task);

        Ok(())
    }

    /// Stop discovery.
    ///
    /// A run that had not finished yet reports [`LinkEvent::DiscoveryFinished`].
    pub async fn cancel_discovery(&self) -> Result<()> {
        self.stop_forwarding().await;
        if let Some(discovery) = &self.discovery {
            discovery.cancel().await?;
            info!("Discovery cancelled");
        }
        Ok(())
    }

    /// Devices reported by the current discovery run.
    pub fn discovered_devices(&self) -> Vec<DeviceRecord> {
        self.tracker.lock().devices().to_vec()
    }

    /// Stop discovery and close any session.
    pub async fn shutdown(&self) {
        if let Err(e) = self.cancel_discovery().await {
            warn!("Failed to cancel discovery: {}", e);
        }
        self.cancel().await;
    }

    /// Stop forwarding the current run, closing it out if it was still going.
    async fn stop_forwarding(&self) {
        let task = self.discovery_task.lock().take();
        let Some(task) = task else {
            return;
        };

        task.abort();
        match task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                info!("Discovery finished (cancelled)");
                self.emit(LinkEvent::DiscoveryFinished);
            }
            Err(e) => warn!("Discovery forwarder ended abnormally: {}", e),
        }
    }

    fn emit(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }
}
