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

//! Error types for wire encoding and framing.

use thiserror::Error;

/// Errors that can occur while framing or parsing wire data.
#[derive(Debug, Error)]
pub enum WireError {
    /// Frame exceeds the maximum allowed size.
    #[error("frame size {size} exceeds maximum {max}", max = crate::MAX_FRAME_SIZE)]
    FrameTooLarge {
        /// The actual frame size.
        size: usize,
    },

    /// Input ended before a complete frame was available.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes available.
        actual: usize,
    },

    /// Codec error during serialization or deserialization.
    #[error("codec error: {0}")]
    Codec(#[from] crate::CodecError),
}
