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

//! Event processing for the application shell.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bluetooth::LinkEvent;
use crate::state::LinkState;

/// Applies link events to the shared state, one at a time.
pub struct EventProcessor {
    state: Arc<LinkState>,
}

impl EventProcessor {
    /// Create a new event processor.
    pub fn new(state: Arc<LinkState>) -> Self {
        Self { state }
    }

    /// Process a single event.
    pub fn process_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::DeviceFound(device) => {
                info!(
                    "Device found: {} | {}{}",
                    device.display_name(),
                    device.address,
                    if device.spp { " [SPP]" } else { "" }
                );
            }
            LinkEvent::DiscoveryFinished => {
                info!("Discovery finished");
            }
            LinkEvent::Connected { address } => {
                info!("Connected: {}", address);
                self.state.set_connected(address);
            }
            LinkEvent::ConnectFailed { address, error } => {
                error!("Connect to {} failed: {}", address, error);
                // A rejected duplicate request leaves the active session alone.
                if error != crate::bluetooth::SessionError::AlreadyBusy {
                    self.state.set_error();
                }
            }
            LinkEvent::MessageReceived(message) => {
                info!("Received: {}", String::from_utf8_lossy(&message).trim_end());
                self.state.record_message(message);
            }
            LinkEvent::BytesSent(bytes) => {
                debug!("Sent: {}", String::from_utf8_lossy(&bytes).trim_end());
            }
            LinkEvent::SendFailed(error) => {
                warn!("Send failed: {}", error);
            }
            LinkEvent::Disconnected { address } => {
                info!("Disconnected: {}", address);
                self.state.set_disconnected();
            }
            LinkEvent::ConnectionLost { address, error } => {
                error!("Connection to {} lost: {}", address, error);
                self.state.set_error();
            }
        }
    }

    /// Drain `events` until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<LinkEvent>) {
        while let Some(event) = events.recv().await {
            self.process_event(event);
        }
        debug!("Event channel closed");
    }
}
