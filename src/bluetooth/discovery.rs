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

//! Per-run de-duplication of discovered devices.

use std::collections::HashSet;

use super::transport::DeviceRecord;

/// Remembers which addresses a discovery run already reported.
///
/// Each run gets a generation number; observations tagged with an older
/// generation are ignored so a stale forwarder cannot leak into a new run.
#[derive(Debug, Default)]
pub struct DiscoveryTracker {
    generation: u64,
    seen: HashSet<String>,
    devices: Vec<DeviceRecord>,
}

impl DiscoveryTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything and start a new run. Returns its generation.
    pub fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.seen.clear();
        self.devices.clear();
        self.generation
    }

    /// Record a device. Returns `true` the first time an address shows up
    /// in the current run.
    pub fn observe(&mut self, generation: u64, record: &DeviceRecord) -> bool {
        if generation != self.generation {
            return false;
        }
        if !self.seen.insert(record.address.clone()) {
            return false;
        }
        self.devices.push(record.clone());
        true
    }

    /// Devices reported in the current run, in discovery order.
    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }
}
