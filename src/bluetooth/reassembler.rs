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

//! Delimiter-based stream reassembly.
//!
//! Serial links deliver bytes in arbitrary chunks. The reassembler glues the
//! chunks back together and cuts the stream after every delimiter, so the
//! caller only ever sees complete messages.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::delimiter::Delimiter;
use super::error::SessionError;

/// Default number of bytes requested per read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Why a receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The source reported end-of-stream.
    ///
    /// `discarded` is the number of trailing bytes that never saw a delimiter.
    Eof { discarded: usize },
    /// The cancellation token fired.
    Cancelled,
}

/// Reassembles delimiter-terminated messages from a byte stream.
pub struct StreamReassembler {
    buffer: Vec<u8>,
    delimiter: Delimiter,
    chunk_size: usize,
}

impl StreamReassembler {
    /// Create a new reassembler for `delimiter`.
    pub fn new(delimiter: Delimiter) -> Self {
        Self::with_chunk_size(delimiter, DEFAULT_READ_CHUNK_SIZE)
    }

    /// Create a reassembler reading `chunk_size` bytes at a time.
    ///
    /// A zero chunk size is bumped to one byte.
    pub fn with_chunk_size(delimiter: Delimiter, chunk_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            delimiter,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Append a chunk and emit every message it completes.
    ///
    /// The delimiter is checked after each appended byte, so a chunk holding
    /// several delimiters yields several messages in stream order.
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_message: F)
    where
        F: FnMut(Vec<u8>),
    {
        for &byte in chunk {
            self.buffer.push(byte);
            if self.delimiter.terminates(&self.buffer) {
                debug!("Message reassembled: {} bytes", self.buffer.len());
                on_message(std::mem::take(&mut self.buffer));
            }
        }
    }

    /// Convenience wrapper around [`feed`](Self::feed) collecting the messages.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut messages = Vec::new();
        self.feed(chunk, |message| messages.push(message));
        messages
    }

    /// Pull bytes from `source` until it ends, fails, or `cancel` fires.
    ///
    /// A trailing remainder without delimiter is never emitted; it is dropped
    /// together with the reassembler state when the loop exits.
    pub async fn run<R, F>(
        &mut self,
        source: &mut R,
        cancel: &CancellationToken,
        mut on_message: F,
    ) -> Result<StreamEnd, SessionError>
    where
        R: AsyncRead + Unpin + ?Sized,
        F: FnMut(Vec<u8>),
    {
        let mut chunk = vec![0u8; self.chunk_size];

        loop {
            if cancel.is_cancelled() {
                return Ok(self.finish(StreamEnd::Cancelled));
            }

            let read = tokio::select! {
                biased;

                () = cancel.cancelled() => return Ok(self.finish(StreamEnd::Cancelled)),

                read = source.read(&mut chunk) => read,
            };

            match read {
                Ok(0) => {
                    let discarded = self.buffer.len();
                    return Ok(self.finish(StreamEnd::Eof { discarded }));
                }
                Ok(n) => {
                    trace!("Read {} bytes", n);
                    self.feed(&chunk[..n], &mut on_message);
                }
                Err(e) => {
                    self.reset();
                    // Closing the handle under a pending read surfaces as an
                    // error on some platforms.
                    if cancel.is_cancelled() {
                        return Ok(StreamEnd::Cancelled);
                    }
                    return Err(SessionError::ReadFailed(e.to_string()));
                }
            }
        }
    }

    fn finish(&mut self, end: StreamEnd) -> StreamEnd {
        if !self.buffer.is_empty() {
            debug!("Discarding {} undelimited bytes", self.buffer.len());
        }
        self.reset();
        end
    }

    /// Discard any partially accumulated message.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes received since the last emitted message.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes received since the last emitted message.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new(Delimiter::default())
    }
}
