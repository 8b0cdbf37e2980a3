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

//! Session and bidirectional-tunnel brokerage.
//!
//! `tunnel-splice` is the core of a traffic-interception manager: it
//! registers long-lived client and agent sessions, keeps them alive through
//! heartbeats, and on demand splices a stream arriving from one session to
//! a stream arriving from the other, so that a TCP/UDP connection is
//! tunneled end-to-end between the two peers.
//!
//! # Architecture
//!
//! - [`SessionRegistry`] owns every session and backs the manager's RPC
//!   surface: open, heartbeat ([`SessionRegistry::mark`]), departure
//!   ([`SessionRegistry::cancel`]), and staleness reaping.
//! - Each [`Session`] carries a waiting-map of half-streams awaiting their
//!   counterpart, an outbound [`DialWatch`] queue toward its long poll, and
//!   a done signal every pending operation listens to.
//! - [`Session::establish_bidi_pipe`] parks one half, pushes a
//!   [`DialRequest`](tunnel_splice_wire::DialRequest) to the peer, and
//!   waits; [`Session::on_connect`] matches the arriving counterpart and
//!   fuses both halves into a [`BidiPipe`] that copies frames each way
//!   until EOF, error, or either session's departure.
//! - Agent sessions additionally carry a [`DnsConduit`] for forwarding
//!   in-cluster lookups, and client sessions a [`ConsumptionMetrics`] block
//!   fed by their pipes.
//!
//! # Example
//!
//! ```ignore
//! use tunnel_splice::{Config, SessionRegistry};
//! use std::time::Instant;
//!
//! let registry = SessionRegistry::new(Config::default())?;
//!
//! // Session lifecycle, driven by the RPC layer.
//! let client = registry.open_client(Instant::now());
//! let agent = registry.open_agent(Instant::now());
//!
//! // The agent's dial long poll.
//! let mut dials = agent.take_dial_watch().unwrap();
//!
//! // A client stream asks for the agent to dial its counterpart; when the
//! // agent's stream arrives, both calls return the same pipe.
//! let pipe = registry.establish_bidi_pipe(agent.id(), client_stream).await?;
//! ```

mod config;
mod dial;
mod dns;
mod error;
mod metrics;
mod pipe;
mod registry;
mod session;
mod state;

pub use config::{Config, ConfigError};
pub use dial::DialWatch;
pub use dns::{DnsConduit, DnsWatch};
pub use error::Error;
pub use metrics::{ActiveGauge, ByteProbe, ConsumptionMetrics};
pub use pipe::{BidiPipe, PipeProbes};
pub use registry::SessionRegistry;
pub use session::{Session, SessionKind};
pub use state::PipeState;

pub use tunnel_splice_transport::{
    MessageReader, MessageWriter, StreamInfo, TunnelStream, DEFAULT_DIAL_TIMEOUT,
};
pub use tunnel_splice_wire::{
    ConnId, ControlCode, DialRequest, DnsRequest, DnsResponse, SessionId, TunnelMessage,
    AGENT_SESSION_ID_PREFIX,
};
