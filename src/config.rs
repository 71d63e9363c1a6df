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

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::{Delimiter, SessionConfig, DEFAULT_READ_CHUNK_SIZE};

const APP_DIR: &str = "spp-link";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Framing and link settings.
    pub link: LinkConfig,

    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Message delimiter. TOML escapes apply, so `"\r\n"` is CR LF.
    pub delimiter: String,

    /// Bytes requested per read.
    pub read_chunk_size: usize,

    /// Handshake timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            delimiter: "\r\n".to_string(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            connect_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// RFCOMM channel to connect to.
    pub rfcomm_channel: u8,

    /// How long one discovery run lasts, in seconds.
    pub discovery_window_secs: u64,

    /// Address used when none is given on the command line.
    pub default_address: Option<String>,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            rfcomm_channel: 1,
            discovery_window_secs: 12,
            default_address: None,
        }
    }
}

impl Config {
    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.link.delimiter.is_empty() {
            bail!("link.delimiter must not be empty");
        }
        if self.link.read_chunk_size == 0 {
            bail!("link.read_chunk_size must be positive");
        }
        Ok(())
    }

    /// Handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.link.connect_timeout_ms)
    }

    /// Discovery window.
    pub fn discovery_window(&self) -> Duration {
        Duration::from_secs(self.bluetooth.discovery_window_secs)
    }

    /// Runtime session settings.
    pub fn session_config(&self) -> Result<SessionConfig> {
        Ok(SessionConfig {
            delimiter: Delimiter::new(self.link.delimiter.as_bytes())?,
            read_chunk_size: self.link.read_chunk_size,
            connect_timeout: self.connect_timeout(),
        })
    }
}
