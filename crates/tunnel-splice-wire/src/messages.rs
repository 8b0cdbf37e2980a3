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

//! Wire value types for the brokerage protocol.
//!
//! These are the frames exchanged between the manager core and its peers:
//! dial instructions pushed toward an agent's long poll, tunnel frames
//! carried on spliced streams, and DNS lookup request/response pairs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Session identifier prefix reserved for agent sessions.
pub const AGENT_SESSION_ID_PREFIX: &str = "agent:";

/// Identifies a registered session.
///
/// Session ids are opaque strings, unique process-wide. Agent sessions carry
/// the reserved [`AGENT_SESSION_ID_PREFIX`]; everything else is a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a new session identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this id names an agent session.
    #[must_use]
    pub fn is_agent(&self) -> bool {
        self.0.starts_with(AGENT_SESSION_ID_PREFIX)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifies one tunneled end-to-end connection.
///
/// Connection ids are opaque byte strings, unique across the lifetime of
/// either of the two sessions that share the connection. The id travels in
/// [`DialRequest`] frames and in the first frame of every tunnel stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub Vec<u8>);

impl ConnId {
    /// Creates a new connection identifier.
    #[must_use]
    pub fn new(id: impl Into<Vec<u8>>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<&[u8]> for ConnId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for ConnId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Instruction pushed toward a session's peer to originate the far end of a
/// tunneled connection.
///
/// Latency and timeout hints are nanosecond counts so the frame stays flat;
/// use [`roundtrip_latency`](Self::roundtrip_latency) and
/// [`dial_timeout`](Self::dial_timeout) for `Duration` views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialRequest {
    /// The connection to dial.
    pub conn_id: ConnId,
    /// Observed round-trip latency toward the requesting peer, in nanoseconds.
    pub roundtrip_latency_ns: i64,
    /// How long the dial may take, in nanoseconds.
    pub dial_timeout_ns: i64,
    /// Opaque trace propagation carrier; injected on send, never interpreted.
    #[serde(default)]
    pub trace_context: HashMap<String, String>,
}

impl DialRequest {
    /// Creates a dial request with the given hints.
    #[must_use]
    pub fn new(conn_id: ConnId, roundtrip_latency: Duration, dial_timeout: Duration) -> Self {
        Self {
            conn_id,
            roundtrip_latency_ns: saturating_ns(roundtrip_latency),
            dial_timeout_ns: saturating_ns(dial_timeout),
            trace_context: HashMap::new(),
        }
    }

    /// Attaches a trace propagation carrier.
    #[must_use]
    pub fn with_trace_context(mut self, carrier: HashMap<String, String>) -> Self {
        self.trace_context = carrier;
        self
    }

    /// Round-trip latency hint as a `Duration`.
    #[must_use]
    pub fn roundtrip_latency(&self) -> Duration {
        duration_from_ns(self.roundtrip_latency_ns)
    }

    /// Dial timeout hint as a `Duration`.
    #[must_use]
    pub fn dial_timeout(&self) -> Duration {
        duration_from_ns(self.dial_timeout_ns)
    }
}

fn saturating_ns(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

#[allow(clippy::cast_sign_loss)]
fn duration_from_ns(ns: i64) -> Duration {
    Duration::from_nanos(ns.max(0) as u64)
}

/// Control code carried by every tunnel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlCode {
    /// Payload bytes.
    Data,
    /// The sender will write no more data but keeps reading.
    CloseWrite,
    /// The sender is done with the stream.
    Eof,
    /// The sender hit a terminal error; the payload holds a message.
    Error,
}

impl std::fmt::Display for ControlCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::CloseWrite => write!(f, "close-write"),
            Self::Eof => write!(f, "eof"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One frame on a tunnel stream.
///
/// The first frame of every stream identifies the connection and the
/// session that owns the stream; subsequent frames carry payload or control
/// codes only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelMessage {
    /// Frame kind.
    pub code: ControlCode,
    /// Connection identity; set on the first frame only.
    pub conn_id: Option<ConnId>,
    /// Owning session identity; set on the first frame only.
    pub session_id: Option<SessionId>,
    /// Payload bytes for `Data` frames, an error message for `Error` frames.
    pub payload: Vec<u8>,
}

impl TunnelMessage {
    /// Creates the stream-opening frame carrying connection and session
    /// identity.
    #[must_use]
    pub fn open(conn_id: ConnId, session_id: SessionId) -> Self {
        Self {
            code: ControlCode::Data,
            conn_id: Some(conn_id),
            session_id: Some(session_id),
            payload: Vec::new(),
        }
    }

    /// Creates a payload frame.
    #[must_use]
    pub fn data(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            code: ControlCode::Data,
            conn_id: None,
            session_id: None,
            payload: payload.into(),
        }
    }

    /// Creates a half-close frame.
    #[must_use]
    pub fn close_write() -> Self {
        Self {
            code: ControlCode::CloseWrite,
            conn_id: None,
            session_id: None,
            payload: Vec::new(),
        }
    }

    /// Creates an end-of-stream frame.
    #[must_use]
    pub fn eof() -> Self {
        Self {
            code: ControlCode::Eof,
            conn_id: None,
            session_id: None,
            payload: Vec::new(),
        }
    }

    /// Creates a terminal error frame.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: ControlCode::Error,
            conn_id: None,
            session_id: None,
            payload: message.into().into_bytes(),
        }
    }

    /// Returns true for frames after which the sender writes nothing more.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.code, ControlCode::Eof | ControlCode::Error)
    }

    /// Number of payload bytes carried by a `Data` frame, zero otherwise.
    #[must_use]
    pub fn data_len(&self) -> usize {
        match self.code {
            ControlCode::Data => self.payload.len(),
            _ => 0,
        }
    }
}

/// DNS lookup forwarded from an agent toward the client side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRequest {
    /// Correlation id, unique among the agent session's pending lookups.
    pub id: String,
    /// Name to resolve.
    pub name: String,
    /// DNS record type.
    pub record_type: u16,
}

impl DnsRequest {
    /// Creates a new lookup request.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, record_type: u16) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            record_type,
        }
    }
}

/// Answer to a previously forwarded [`DnsRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsResponse {
    /// Correlation id copied from the request.
    pub id: String,
    /// DNS response code.
    pub rcode: u8,
    /// Encoded answer records.
    pub answers: Vec<u8>,
}

impl DnsResponse {
    /// Creates a new lookup response.
    #[must_use]
    pub fn new(id: impl Into<String>, rcode: u8, answers: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            rcode,
            answers: answers.into(),
        }
    }
}
