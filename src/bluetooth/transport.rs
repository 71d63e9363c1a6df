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

//! Platform collaborators: byte-stream connectors and device discovery.

use anyhow::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpSocket};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::SessionError;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A bidirectional byte stream owned by a session.
pub trait SerialStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> SerialStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased stream returned by connectors.
pub type BoxedStream = Box<dyn SerialStream>;

/// Opens byte-stream connections to devices.
///
/// Dropping the returned stream closes it.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Open a connection to `address`.
    async fn connect(&self, address: &str) -> Result<BoxedStream, SessionError>;
}

/// A device seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Opaque device identifier (MAC address for Bluetooth).
    pub address: String,
    /// Display name, if the device reported one.
    pub name: Option<String>,
    /// Whether the device advertises the serial port profile.
    pub spp: bool,
}

impl DeviceRecord {
    /// Create a record without service information.
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
            spp: false,
        }
    }

    /// Create a record from the service UUIDs a device advertises.
    pub fn from_services(
        address: impl Into<String>,
        name: Option<String>,
        services: impl IntoIterator<Item = Uuid>,
    ) -> Self {
        let spp = services.into_iter().any(|uuid| uuid == SPP_UUID);
        Self {
            address: address.into(),
            name,
            spp,
        }
    }

    /// Name for display, falling back to the address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

/// Notification from a discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A device was seen (possibly again).
    DeviceFound(DeviceRecord),
    /// The discovery run ended.
    Finished,
}

/// Platform device discovery.
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    /// Start a discovery run and subscribe to its notifications.
    async fn start(&self) -> Result<mpsc::Receiver<DiscoveryEvent>>;

    /// Stop the current discovery run, if any.
    async fn cancel(&self) -> Result<()>;
}

/// Connector for serial bridges reachable over TCP (`host:port`).
///
/// The handshake deadline is `SessionConfig::connect_timeout`, enforced by
/// the session around every connector.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn connect(&self, address: &str) -> Result<BoxedStream, SessionError> {
        let target = lookup_host(address)
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| SessionError::AddressResolutionFailed(address.to_string()))?;
        debug!("Resolved {} to {}", address, target);

        let socket = match target {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        };
        let socket = socket.map_err(|e| SessionError::SocketCreationFailed(e.to_string()))?;

        let stream = socket
            .connect(target)
            .await
            .map_err(|e| SessionError::ConnectFailed(e.to_string()))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle on {}: {}", target, e);
        }

        info!("TCP link open to {}", target);
        Ok(Box::new(stream))
    }
}
