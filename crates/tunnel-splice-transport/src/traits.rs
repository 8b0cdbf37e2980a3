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

//! Half-stream trait definitions.
//!
//! A [`TunnelStream`] is the manager's handle on one peer's side of a
//! tunneled connection: a message-level bidirectional stream plus the
//! identity and timing metadata the brokerage needs for rendezvous. The
//! traits abstract over the concrete transport so the core works the same
//! over gRPC adapters, framed byte streams, or in-memory test pairs.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tunnel_splice_wire::{ConnId, SessionId, TunnelMessage};

/// Default dial timeout hint for streams that do not carry one.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity and timing metadata of a half-stream.
///
/// Carried by the stream's opening frame and surfaced to the brokerage,
/// which uses the timing hints to size the rendezvous deadline.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// The tunneled connection this stream belongs to.
    pub conn_id: ConnId,
    /// The session that owns this half.
    pub session_id: SessionId,
    /// Observed round-trip latency toward the owning peer.
    pub roundtrip_latency: Duration,
    /// How long the far side may take to dial.
    pub dial_timeout: Duration,
    /// Opaque trace propagation carrier attached by the transport layer.
    pub trace_context: HashMap<String, String>,
}

impl StreamInfo {
    /// Creates stream metadata with default timing hints.
    #[must_use]
    pub fn new(conn_id: ConnId, session_id: SessionId) -> Self {
        Self {
            conn_id,
            session_id,
            roundtrip_latency: Duration::ZERO,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            trace_context: HashMap::new(),
        }
    }

    /// Sets the round-trip latency hint.
    #[must_use]
    pub const fn with_roundtrip_latency(mut self, latency: Duration) -> Self {
        self.roundtrip_latency = latency;
        self
    }

    /// Sets the dial timeout hint.
    #[must_use]
    pub const fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Attaches a trace propagation carrier.
    #[must_use]
    pub fn with_trace_context(mut self, carrier: HashMap<String, String>) -> Self {
        self.trace_context = carrier;
        self
    }
}

/// One session's side of a tunneled connection.
///
/// Splitting yields independently owned read and write halves so the two
/// directions of a spliced pipe can run on separate tasks.
pub trait TunnelStream: Send + 'static {
    /// The read half produced by splitting.
    type Reader: MessageReader;
    /// The write half produced by splitting.
    type Writer: MessageWriter;

    /// Returns the stream's identity and timing metadata.
    fn info(&self) -> &StreamInfo;

    /// Splits the stream into its read and write halves.
    fn into_split(self) -> (Self::Reader, Self::Writer);
}

/// Read half of a [`TunnelStream`].
pub trait MessageReader: Send + 'static {
    /// Error type for receive failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Receives the next message.
    ///
    /// Resolves to `Ok(None)` when the peer has closed its side.
    fn recv(&mut self) -> impl Future<Output = Result<Option<TunnelMessage>, Self::Error>> + Send;
}

/// Write half of a [`TunnelStream`].
pub trait MessageWriter: Send + 'static {
    /// Error type for send failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends one message.
    fn send(&mut self, message: TunnelMessage)
        -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Gracefully finishes the write side, signaling no more messages.
    fn close(self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
