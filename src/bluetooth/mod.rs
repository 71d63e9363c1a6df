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

//! Bluetooth serial link module.
//!
//! Connects to SPP devices, reassembles delimiter-terminated messages from
//! the incoming byte stream, and writes raw bytes back.

pub mod delimiter;
mod discovery;
mod error;
pub mod reassembler;
#[cfg(feature = "bluetoothd")]
mod rfcomm;
mod session;
mod supervisor;
mod transport;

pub use delimiter::{matches, Delimiter, CRLF};
pub use discovery::DiscoveryTracker;
pub use error::SessionError;
pub use reassembler::{StreamEnd, StreamReassembler, DEFAULT_READ_CHUNK_SIZE};
#[cfg(feature = "bluetoothd")]
pub use rfcomm::{default_adapter, BluezDiscovery, RfcommConnector, DEFAULT_RFCOMM_CHANNEL};
pub use session::{ConnectionSession, LinkEvent, SessionConfig, SessionState};
pub use supervisor::SessionSupervisor;
pub use transport::{
    BoxedStream, Connector, DeviceDiscovery, DeviceRecord, DiscoveryEvent, SerialStream,
    TcpConnector, DEFAULT_CONNECT_TIMEOUT, SPP_UUID,
};
