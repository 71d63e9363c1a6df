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

//! Message delimiter and suffix matching.

use anyhow::{bail, Result};
use std::fmt;

/// Default delimiter: carriage return + line feed.
pub const CRLF: &[u8] = b"\r\n";

/// Returns `true` when `buffer` ends with `delimiter`.
///
/// Only the trailing `delimiter.len()` bytes are compared, and every one of
/// them has to match.
pub fn matches(buffer: &[u8], delimiter: &[u8]) -> bool {
    if buffer.len() < delimiter.len() {
        return false;
    }

    let tail = &buffer[buffer.len() - delimiter.len()..];
    tail.iter().zip(delimiter).all(|(a, b)| a == b)
}

/// Byte sequence terminating one message in the stream.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Delimiter(Vec<u8>);

impl Delimiter {
    /// Create a delimiter. Empty sequences are rejected.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            bail!("delimiter must not be empty");
        }
        Ok(Self(bytes))
    }

    /// Delimiter bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes in the delimiter.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true for a constructed delimiter.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether `buffer` currently ends with this delimiter.
    pub fn terminates(&self, buffer: &[u8]) -> bool {
        matches(buffer, &self.0)
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self(CRLF.to_vec())
    }
}

impl fmt::Debug for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Delimiter(\"{}\")", self.0.escape_ascii())
    }
}
