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

//! Byte counters and liveness gauges.
//!
//! Writers are the pipe copy loops; readers are stats endpoints. Everything
//! here is a relaxed atomic, no locks.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// A shared monotonic byte counter fed by a pipe copy loop.
#[derive(Debug, Clone, Default)]
pub struct ByteProbe(Arc<AtomicU64>);

impl ByteProbe {
    /// Creates a new probe at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds to the counter.
    pub fn add(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Reads the counter.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-client-session traffic counters.
///
/// `from_client` accumulates bytes the client half wrote; `to_client`
/// accumulates bytes written to the client half.
#[derive(Debug, Clone, Default)]
pub struct ConsumptionMetrics {
    from_client: ByteProbe,
    to_client: ByteProbe,
}

impl ConsumptionMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes the client half has written.
    #[must_use]
    pub fn from_client_bytes(&self) -> u64 {
        self.from_client.get()
    }

    /// Total bytes written to the client half.
    #[must_use]
    pub fn to_client_bytes(&self) -> u64 {
        self.to_client.get()
    }

    /// Probe handle feeding the from-client counter.
    #[must_use]
    pub fn from_client_probe(&self) -> ByteProbe {
        self.from_client.clone()
    }

    /// Probe handle feeding the to-client counter.
    #[must_use]
    pub fn to_client_probe(&self) -> ByteProbe {
        self.to_client.clone()
    }
}

/// Count of currently live pipes, shared across the registry.
#[derive(Debug, Clone, Default)]
pub struct ActiveGauge(Arc<AtomicUsize>);

impl ActiveGauge {
    /// Creates a gauge at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    /// Reads the current count.
    #[must_use]
    pub fn current(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_share_their_counter() {
        let metrics = ConsumptionMetrics::new();
        let probe = metrics.from_client_probe();

        probe.add(100);
        probe.add(24);

        assert_eq!(metrics.from_client_bytes(), 124);
        assert_eq!(metrics.to_client_bytes(), 0);
    }

    #[test]
    fn gauge_tracks_up_and_down() {
        let gauge = ActiveGauge::new();
        gauge.increment();
        gauge.increment();
        assert_eq!(gauge.current(), 2);
        gauge.decrement();
        assert_eq!(gauge.current(), 1);
    }
}
