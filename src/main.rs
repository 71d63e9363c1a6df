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

//! spp-link: serial terminal for SPP devices.
//!
//! Usage: `spp-link [ADDRESS]` or `spp-link --scan`.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spp_link::bluetooth::{LinkEvent, SessionSupervisor};
use spp_link::config::Config;
use spp_link::events::EventProcessor;
use spp_link::state::LinkState;

#[cfg(feature = "bluetoothd")]
async fn build_supervisor(
    config: &Config,
) -> Result<(SessionSupervisor, mpsc::UnboundedReceiver<LinkEvent>)> {
    use spp_link::bluetooth::{default_adapter, BluezDiscovery, RfcommConnector};

    let adapter = default_adapter().await?;
    let connector = Arc::new(RfcommConnector::new(config.bluetooth.rfcomm_channel));
    let discovery = Arc::new(BluezDiscovery::new(adapter, config.discovery_window()));

    let (supervisor, event_rx) = SessionSupervisor::new(connector, config.session_config()?);
    Ok((supervisor.with_discovery(discovery), event_rx))
}

#[cfg(not(feature = "bluetoothd"))]
async fn build_supervisor(
    config: &Config,
) -> Result<(SessionSupervisor, mpsc::UnboundedReceiver<LinkEvent>)> {
    use spp_link::bluetooth::TcpConnector;

    info!("Built without BlueZ support, addresses are host:port");
    let connector = Arc::new(TcpConnector::new());
    Ok(SessionSupervisor::new(connector, config.session_config()?))
}

async fn scan(supervisor: &SessionSupervisor, config: &Config) -> Result<()> {
    supervisor.start_discovery().await?;
    tokio::time::sleep(config.discovery_window()).await;
    supervisor.cancel_discovery().await?;

    for device in supervisor.discovered_devices() {
        println!("{}\t{}", device.address, device.display_name());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("spp_link=info".parse()?))
        .init();

    info!("Starting spp-link v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    let (supervisor, event_rx) = build_supervisor(&config).await?;
    let supervisor = Arc::new(supervisor);

    // Single consumer keeps events in order
    let state = LinkState::new();
    let processor = EventProcessor::new(state.clone());
    let events = tokio::spawn(processor.run(event_rx));

    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("--scan") {
        let result = scan(&supervisor, &config).await;
        supervisor.shutdown().await;
        return result;
    }

    let address = arg
        .or_else(|| config.bluetooth.default_address.clone())
        .ok_or_else(|| anyhow!("No device address given and none configured"))?;

    state.set_connecting();
    let attempt = supervisor.connect(&address)?;
    if let Err(e) = attempt.await? {
        error!("Could not connect to {}: {}", address, e);
        supervisor.shutdown().await;
        return Err(e.into());
    }

    let delimiter = supervisor.config().delimiter;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Ready. Type a line to send it, Ctrl-C to quit.");

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let mut bytes = line.into_bytes();
                    bytes.extend_from_slice(delimiter.as_bytes());
                    if let Err(e) = supervisor.send(&bytes).await {
                        warn!("Could not send: {}", e);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    supervisor.shutdown().await;
    drop(supervisor);
    if let Err(e) = events.await {
        warn!("Event processor ended abnormally: {}", e);
    }

    info!("spp-link stopped");
    Ok(())
}
