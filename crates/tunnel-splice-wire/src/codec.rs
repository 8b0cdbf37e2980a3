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

//! Codec abstraction for message serialization.
//!
//! A pluggable trait with a default bincode implementation; the frame
//! payloads produced here are what [`crate::FrameWriter`] wraps on the wire.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Errors that can occur during codec operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("serialization failed: {0}")]
    Serialize(String),

    /// Deserialization failed.
    #[error("deserialization failed: {0}")]
    Deserialize(String),
}

/// Trait for message serialization codecs.
///
/// Implementations must be thread-safe; a codec is shared across the tasks
/// serving one stream.
pub trait Codec: Send + Sync + 'static {
    /// Encodes a value to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decodes bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError>;
}

/// Bincode codec for compact binary serialization.
///
/// This is the default codec for tunnel frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    /// Creates a new bincode codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(value).map_err(|e| CodecError::Serialize(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError> {
        bincode::deserialize(data).map_err(|e| CodecError::Deserialize(e.to_string()))
    }
}
