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

//! Session error kinds.

use thiserror::Error;

/// Errors produced by a serial link session.
///
/// Every variant carries owned data so errors can travel inside
/// [`LinkEvent`](super::LinkEvent)s.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The target address could not be resolved to a device.
    #[error("could not resolve address '{0}'")]
    AddressResolutionFailed(String),

    /// The platform refused to create a socket for the device.
    #[error("could not create socket: {0}")]
    SocketCreationFailed(String),

    /// The handshake failed, timed out, or was refused.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Another session is already connecting or connected.
    #[error("another connection is already in progress")]
    AlreadyBusy,

    /// Reading from an established link failed.
    #[error("receive failed: {0}")]
    ReadFailed(String),

    /// Writing to an established link failed.
    #[error("send failed: {0}")]
    WriteFailed(String),

    /// No session is connected.
    #[error("not connected")]
    NotConnected,

    /// The connect attempt was cancelled before the handshake finished.
    #[error("connect cancelled")]
    Cancelled,

    /// The session already closed or failed and cannot be reused.
    #[error("session already terminated")]
    Terminated,
}
