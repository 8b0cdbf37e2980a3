// Copyright 2024-2026 Farlight Networks, LLC
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

//! Length-prefixed framing for tunnel messages.
//!
//! Every message travels as a length-prefixed frame:
//!
//! ```text
//! ┌──────────────────┬─────────────────────────────────┐
//! │  Length (4 bytes)│         Payload (N bytes)       │
//! │    big-endian    │      codec-encoded message      │
//! └──────────────────┴─────────────────────────────────┘
//! ```
//!
//! Tunnel frames carry connection payload, so the cap is higher than a
//! typical control channel would use; oversized frames are rejected before
//! any allocation happens on their behalf.

use crate::WireError;
use bytes::{Buf, BufMut, BytesMut};

/// Maximum frame size (256 KiB).
pub const MAX_FRAME_SIZE: usize = 256 * 1024;

/// Length prefix size in bytes.
const LENGTH_PREFIX_SIZE: usize = 4;

/// Incrementally parses length-prefixed frames out of a byte buffer.
///
/// Feed arriving bytes with [`extend`](Self::extend) and drain complete
/// frames with [`next_frame`](Self::next_frame); partial frames stay
/// buffered until the remainder arrives.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: BytesMut,
}

impl FrameReader {
    /// Creates a new frame reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new frame reader with the specified initial capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to drain one complete frame from the buffer.
    ///
    /// Returns `Ok(Some(payload))` if a complete frame is available and
    /// `Ok(None)` if more data is needed.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::FrameTooLarge`] if the announced length exceeds
    /// [`MAX_FRAME_SIZE`].
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        if self.buffer.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let length = u32::from_be_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]) as usize;

        if length > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge { size: length });
        }

        if self.buffer.len() < LENGTH_PREFIX_SIZE + length {
            return Ok(None);
        }

        self.buffer.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(self.buffer.split_to(length).to_vec()))
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no partial data is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Accumulates length-prefixed frames for writing.
#[derive(Debug, Default)]
pub struct FrameWriter {
    buffer: BytesMut,
}

impl FrameWriter {
    /// Creates a new frame writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new frame writer with the specified initial capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends one frame with the given payload.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::FrameTooLarge`] if the payload exceeds
    /// [`MAX_FRAME_SIZE`].
    pub fn push_frame(&mut self, payload: &[u8]) -> Result<(), WireError> {
        if payload.len() > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge {
                size: payload.len(),
            });
        }

        self.buffer.reserve(LENGTH_PREFIX_SIZE + payload.len());
        #[allow(clippy::cast_possible_truncation)]
        self.buffer.put_u32(payload.len() as u32);
        self.buffer.extend_from_slice(payload);
        Ok(())
    }

    /// Takes the accumulated bytes, clearing the internal buffer.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        self.buffer.split().to_vec()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Encodes a single payload into a length-prefixed frame.
///
/// # Errors
///
/// Returns [`WireError::FrameTooLarge`] if the payload exceeds
/// [`MAX_FRAME_SIZE`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut writer = FrameWriter::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    writer.push_frame(payload)?;
    Ok(writer.take_bytes())
}

/// Decodes a single complete length-prefixed frame, returning the payload.
///
/// # Errors
///
/// Returns [`WireError::Truncated`] if the input is shorter than the frame
/// it announces, or [`WireError::FrameTooLarge`] for an oversized length.
pub fn decode_frame(data: &[u8]) -> Result<Vec<u8>, WireError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(WireError::Truncated {
            expected: LENGTH_PREFIX_SIZE,
            actual: data.len(),
        });
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge { size: length });
    }

    let total = LENGTH_PREFIX_SIZE + length;
    if data.len() < total {
        return Err(WireError::Truncated {
            expected: total,
            actual: data.len(),
        });
    }

    Ok(data[LENGTH_PREFIX_SIZE..total].to_vec())
}
