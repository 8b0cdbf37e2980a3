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

//! Pipe lifecycle state machine.
//!
//! Defines the states a bidirectional pipe moves through and the valid
//! transitions between them.

/// Pipe lifecycle state.
///
/// The pipe progresses through these states:
/// ```text
/// Created ──► Started ──► Closing ──► Closed
///     │
///     └────────────────────────────► Closed (abandoned before start)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipeState {
    /// Constructed, copy loops not yet running.
    #[default]
    Created,
    /// Both directional copy loops are running.
    Started,
    /// One direction has terminated; teardown in progress.
    Closing,
    /// Both directions have terminated.
    Closed,
}

impl PipeState {
    /// Converts from the u8 representation used in atomic storage.
    #[must_use]
    pub(crate) const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Started,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Returns true once both copy loops have terminated.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true while the pipe can still move bytes.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }

    /// Returns true if a transition to the target state is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        use PipeState::{Closed, Closing, Created, Started};

        matches!(
            (*self, target),
            (Created, Started) | (Started, Closing) | (Closing, Closed) | (Created, Closed)
        )
    }
}

impl std::fmt::Display for PipeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
