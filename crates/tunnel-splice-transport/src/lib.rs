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

//! Half-stream transport abstraction for tunnel-splice.
//!
//! The brokerage core rendezvouses pairs of [`TunnelStream`] halves without
//! caring how their messages move. This crate defines those traits and two
//! realizations: a framed adapter over raw byte streams, and an in-memory
//! mock pair for tests.

mod error;
mod framed;
mod mock;
mod traits;

pub use error::TransportError;
pub use framed::{FramedReader, FramedStream, FramedWriter};
pub use mock::{mock_stream_pair, MockError, MockReader, MockTunnelStream, MockWriter};
pub use traits::{
    MessageReader, MessageWriter, StreamInfo, TunnelStream, DEFAULT_DIAL_TIMEOUT,
};
