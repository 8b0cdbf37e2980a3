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

//! Wire protocol for the tunnel-splice brokerage core.
//!
//! This crate provides the value types carried between the manager and its
//! peers, together with the codec and framing layers used by byte-stream
//! embeddings of the protocol.

mod codec;
mod error;
mod framing;
mod messages;

pub use codec::{BincodeCodec, Codec, CodecError};
pub use error::WireError;
pub use framing::{decode_frame, encode_frame, FrameReader, FrameWriter, MAX_FRAME_SIZE};
pub use messages::{
    ConnId, ControlCode, DialRequest, DnsRequest, DnsResponse, SessionId, TunnelMessage,
    AGENT_SESSION_ID_PREFIX,
};
