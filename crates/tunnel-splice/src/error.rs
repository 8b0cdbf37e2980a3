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

//! Error types surfaced at the brokerage boundary.

use thiserror::Error;
use tunnel_splice_wire::{ConnId, SessionId};

/// Errors that can occur during brokerage operations.
///
/// The core never retries: every error here reports a condition the caller
/// must react to, usually by closing the stream that triggered it.
#[derive(Debug, Error)]
pub enum Error {
    /// No session registered under the given id.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// A rendezvous is already pending for this connection in this session.
    #[error("connection {0} is already awaiting rendezvous")]
    AlreadyExists(ConnId),

    /// The session terminated before the operation completed.
    #[error("session cancelled")]
    Cancelled,

    /// The rendezvous window elapsed.
    #[error("timeout while establishing bidirectional pipe")]
    DeadlineExceeded,

    /// Underlying stream read or write failure.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Invariant violation; reported verbatim.
    #[error("internal error: {0}")]
    Internal(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl Error {
    /// Creates a transport error from any error type.
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(error))
    }

    /// Creates an internal invariant-violation error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::NotFound(SessionId::from("client-1"));
        assert_eq!(err.to_string(), "session not found: client-1");

        let err = Error::AlreadyExists(ConnId::new(vec![0xab]));
        assert!(err.to_string().contains("ab"));

        let err = Error::transport(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe broke",
        ));
        assert!(err.to_string().contains("pipe broke"));
    }
}
