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

//! Application-facing link state.

use parking_lot::RwLock;
use std::sync::Arc;

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Shared link state.
#[derive(Debug)]
pub struct LinkState {
    /// Current connection status.
    pub connection_status: RwLock<ConnectionStatus>,

    /// Address of the connected device.
    pub connected_device: RwLock<Option<String>>,

    /// Last received message.
    pub last_message: RwLock<Option<Vec<u8>>>,

    /// Messages received since start-up.
    pub message_count: RwLock<u64>,
}

impl Default for LinkState {
    fn default() -> Self {
        Self {
            connection_status: RwLock::new(ConnectionStatus::Disconnected),
            connected_device: RwLock::new(None),
            last_message: RwLock::new(None),
            message_count: RwLock::new(0),
        }
    }
}

impl LinkState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_connecting(&self) {
        *self.connection_status.write() = ConnectionStatus::Connecting;
    }

    pub fn set_connected(&self, address: String) {
        *self.connection_status.write() = ConnectionStatus::Connected;
        *self.connected_device.write() = Some(address);
    }

    pub fn set_disconnected(&self) {
        *self.connection_status.write() = ConnectionStatus::Disconnected;
        *self.connected_device.write() = None;
    }

    pub fn set_error(&self) {
        *self.connection_status.write() = ConnectionStatus::Error;
        *self.connected_device.write() = None;
    }

    pub fn get_status(&self) -> ConnectionStatus {
        *self.connection_status.read()
    }

    pub fn get_device(&self) -> Option<String> {
        self.connected_device.read().clone()
    }

    pub fn record_message(&self, message: Vec<u8>) {
        *self.last_message.write() = Some(message);
        *self.message_count.write() += 1;
    }

    pub fn get_last_message(&self) -> Option<Vec<u8>> {
        self.last_message.read().clone()
    }

    pub fn get_message_count(&self) -> u64 {
        *self.message_count.read()
    }
}
