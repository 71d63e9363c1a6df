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

//! BlueZ backends: RFCOMM client connector and classic device discovery.

use anyhow::Result;
use async_trait::async_trait;
use bluer::rfcomm::{Socket, SocketAddr};
use bluer::{Adapter, AdapterEvent, Address};
use futures::StreamExt;
use parking_lot::Mutex;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::SessionError;
use super::transport::{BoxedStream, Connector, DeviceDiscovery, DeviceRecord, DiscoveryEvent};

/// RFCOMM channel SPP devices listen on by default.
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Open a BlueZ session and return the powered default adapter.
pub async fn default_adapter() -> Result<Adapter> {
    let session = bluer::Session::new().await?;
    info!("BlueZ session created");

    let adapter = session.default_adapter().await?;
    info!("Using Bluetooth adapter: {}", adapter.name());

    if !adapter.is_powered().await? {
        info!("Powering on Bluetooth adapter...");
        adapter.set_powered(true).await?;
    }

    Ok(adapter)
}

/// Connects to SPP devices over RFCOMM.
#[derive(Debug, Clone)]
pub struct RfcommConnector {
    channel: u8,
}

impl RfcommConnector {
    pub fn new(channel: u8) -> Self {
        Self { channel }
    }
}

impl Default for RfcommConnector {
    fn default() -> Self {
        Self::new(DEFAULT_RFCOMM_CHANNEL)
    }
}

#[async_trait]
impl Connector for RfcommConnector {
    fn name(&self) -> &'static str {
        "rfcomm"
    }

    async fn connect(&self, address: &str) -> Result<BoxedStream, SessionError> {
        let device = Address::from_str(address)
            .map_err(|_| SessionError::AddressResolutionFailed(address.to_string()))?;

        let socket = Socket::new().map_err(|e| SessionError::SocketCreationFailed(e.to_string()))?;

        let stream = socket
            .connect(SocketAddr::new(device, self.channel))
            .await
            .map_err(|e| SessionError::ConnectFailed(e.to_string()))?;

        info!("RFCOMM link open to {} channel {}", device, self.channel);
        Ok(Box::new(stream))
    }
}

/// Classic discovery through the BlueZ adapter.
///
/// A run lasts for a fixed window, after which `Finished` is reported.
pub struct BluezDiscovery {
    adapter: Adapter,
    window: Duration,
    running: Mutex<Option<CancellationToken>>,
}

impl BluezDiscovery {
    pub fn new(adapter: Adapter, window: Duration) -> Self {
        Self {
            adapter,
            window,
            running: Mutex::new(None),
        }
    }

    async fn describe(adapter: &Adapter, address: Address) -> DeviceRecord {
        let device = match adapter.device(address) {
            Ok(device) => device,
            Err(e) => {
                debug!("No device object for {}: {}", address, e);
                return DeviceRecord::new(address.to_string(), None);
            }
        };

        let name = device.name().await.ok().flatten();
        let services = device.uuids().await.ok().flatten().unwrap_or_default();
        DeviceRecord::from_services(address.to_string(), name, services)
    }
}

#[async_trait]
impl DeviceDiscovery for BluezDiscovery {
    async fn start(&self) -> Result<mpsc::Receiver<DiscoveryEvent>> {
        let token = CancellationToken::new();
        if let Some(previous) = self.running.lock().replace(token.clone()) {
            previous.cancel();
        }

        let devices = self.adapter.discover_devices().await?;
        let adapter = self.adapter.clone();
        let window = self.window;
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            futures::pin_mut!(devices);
            let deadline = tokio::time::sleep(window);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = &mut deadline => break,
                    event = devices.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => {
                            let record = Self::describe(&adapter, address).await;
                            if tx.send(DiscoveryEvent::DeviceFound(record)).await.is_err() {
                                return;
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }

            if tx.send(DiscoveryEvent::Finished).await.is_err() {
                warn!("Discovery finished with nobody listening");
            }
        });

        Ok(rx)
    }

    async fn cancel(&self) -> Result<()> {
        if let Some(token) = self.running.lock().take() {
            token.cancel();
        }
        Ok(())
    }
}
