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

//! Transport error types.

use thiserror::Error;
use tunnel_splice_wire::WireError;

/// Errors that can occur on a framed byte-stream transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The stream was closed by the peer.
    #[error("stream closed")]
    Closed,

    /// The stream closed mid-frame.
    #[error("stream closed with {0} buffered bytes of a partial frame")]
    PartialFrame(usize),

    /// I/O error on the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing or codec error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}

impl From<tunnel_splice_wire::CodecError> for TransportError {
    fn from(e: tunnel_splice_wire::CodecError) -> Self {
        Self::Wire(WireError::from(e))
    }
}
