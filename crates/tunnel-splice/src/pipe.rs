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

//! The bidirectional pipe formed by two rendezvoused half-streams.
//!
//! A pipe owns two directional copy loops, each forwarding frames from one
//! half's read side to the other half's write side and feeding the
//! direction's byte probe. The first direction to terminate (EOF frame,
//! transport EOF, error, or an owning session's done signal) cancels the
//! shared pipe context; the second loop unwinds and the pipe reports its
//! terminal status once. There are no retries at this layer: whoever
//! reopens the connection owns transport resilience.

use crate::metrics::{ActiveGauge, ByteProbe};
use crate::state::PipeState;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};
use tunnel_splice_transport::{MessageReader, MessageWriter, TunnelStream};
use tunnel_splice_wire::ControlCode;

/// Byte probes wired into a pipe's two directions.
#[derive(Debug, Clone, Default)]
pub struct PipeProbes {
    /// Counts payload bytes copied from half A toward half B.
    pub a_to_b: Option<ByteProbe>,
    /// Counts payload bytes copied from half B toward half A.
    pub b_to_a: Option<ByteProbe>,
}

/// Handle on a spliced pair of half-streams.
///
/// Both rendezvous participants receive clones of the same handle;
/// [`same_pipe`](Self::same_pipe) tests that identity.
#[derive(Debug, Clone)]
pub struct BidiPipe {
    inner: Arc<PipeInner>,
}

#[derive(Debug)]
struct PipeInner {
    name: String,
    state: AtomicU8,
    /// Shared pipe context; cancelling it unwinds both copy loops.
    cancel: CancellationToken,
    /// Fires once both loops have terminated.
    closed: CancellationToken,
    gauge: ActiveGauge,
}

impl BidiPipe {
    pub(crate) fn new(name: String, gauge: ActiveGauge) -> Self {
        Self {
            inner: Arc::new(PipeInner {
                name,
                state: AtomicU8::new(PipeState::Created as u8),
                cancel: CancellationToken::new(),
                closed: CancellationToken::new(),
                gauge,
            }),
        }
    }

    /// Human-readable pipe name, `"<conn-id>: session <a> -> <b>"`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PipeState {
        PipeState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Returns true once both copy loops have terminated.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Returns true if `other` is a handle on the same pipe.
    #[must_use]
    pub fn same_pipe(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Waits until both copy loops have terminated.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    /// Requests teardown.
    ///
    /// Idempotent; a pipe that never started moves straight to `Closed`.
    pub fn close(&self) {
        if self.try_transition(PipeState::Created, PipeState::Closed) {
            debug!(pipe = %self.inner.name, "closing never-started pipe");
            self.inner.closed.cancel();
            return;
        }
        self.inner.cancel.cancel();
    }

    /// Starts both directional copy loops.
    ///
    /// `watch` carries the done signals of the two owning sessions; either
    /// firing tears the pipe down.
    pub(crate) fn start<A, B>(
        &self,
        a: A,
        b: B,
        probes: PipeProbes,
        watch: (CancellationToken, CancellationToken),
    ) where
        A: TunnelStream,
        B: TunnelStream,
    {
        if !self.advance(PipeState::Started) {
            warn!(pipe = %self.inner.name, state = %self.state(), "refusing to start pipe");
            return;
        }
        self.inner.gauge.increment();
        debug!(pipe = %self.inner.name, "pipe started");

        let (a_rx, a_tx) = a.into_split();
        let (b_rx, b_tx) = b.into_split();
        let cancel = self.inner.cancel.clone();

        // Tie the pipe context to both session lifecycles.
        {
            let cancel = cancel.clone();
            let (done_a, done_b) = watch;
            tokio::spawn(async move {
                tokio::select! {
                    () = done_a.cancelled() => cancel.cancel(),
                    () = done_b.cancelled() => cancel.cancel(),
                    () = cancel.cancelled() => {}
                }
            });
        }

        let mut forward = tokio::spawn(pump(a_rx, b_tx, probes.a_to_b, cancel.clone(), "a->b"));
        let mut reverse = tokio::spawn(pump(b_rx, a_tx, probes.b_to_a, cancel.clone(), "b->a"));

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let (first, second) = tokio::select! {
                first = &mut forward => (join_outcome(first), join_outcome(reverse.await)),
                first = &mut reverse => (join_outcome(first), join_outcome(forward.await)),
            };
            inner.finish(&first, &second);
        });
    }

    fn advance(&self, to: PipeState) -> bool {
        self.inner.advance(to)
    }

    fn try_transition(&self, from: PipeState, to: PipeState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl PipeInner {
    /// Moves to `to` if the transition is valid from the current state.
    fn advance(&self, to: PipeState) -> bool {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if !PipeState::from_u8(current).can_transition_to(to) {
                return false;
            }
            match self.state.compare_exchange(
                current,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Completes teardown after both loops have terminated.
    fn finish(&self, first: &DirOutcome, second: &DirOutcome) {
        if !self.advance(PipeState::Closing) && !self.state_is(PipeState::Closing) {
            error!(pipe = %self.name, state = %PipeState::from_u8(self.state.load(Ordering::SeqCst)),
                "pipe teardown from unexpected state");
        }
        if !self.advance(PipeState::Closed) {
            error!(pipe = %self.name, "pipe failed to reach closed state");
        }
        self.gauge.decrement();

        match (first, second) {
            (DirOutcome::Error(e), _) | (_, DirOutcome::Error(e)) => {
                warn!(pipe = %self.name, error = %e, "pipe closed after stream error");
            }
            _ => debug!(pipe = %self.name, first = %first, second = %second, "pipe closed"),
        }
        self.closed.cancel();
    }

    fn state_is(&self, state: PipeState) -> bool {
        PipeState::from_u8(self.state.load(Ordering::SeqCst)) == state
    }
}

/// How one copy direction ended.
#[derive(Debug)]
enum DirOutcome {
    Eof,
    Cancelled,
    Error(String),
}

impl std::fmt::Display for DirOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eof => write!(f, "eof"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

fn join_outcome(joined: Result<DirOutcome, tokio::task::JoinError>) -> DirOutcome {
    joined.unwrap_or_else(|e| DirOutcome::Error(format!("copy loop panicked: {e}")))
}

/// One directional copy loop: read side of one half to write side of the
/// other, feeding the direction's byte probe on every forwarded data frame.
async fn pump<R, W>(
    mut rx: R,
    mut tx: W,
    probe: Option<ByteProbe>,
    cancel: CancellationToken,
    dir: &'static str,
) -> DirOutcome
where
    R: MessageReader,
    W: MessageWriter,
{
    let outcome = loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break DirOutcome::Cancelled,
            received = rx.recv() => received,
        };
        match received {
            Ok(Some(message)) => {
                let bytes = message.data_len() as u64;
                let terminal = message.is_terminal();
                let failure = (message.code == ControlCode::Error)
                    .then(|| String::from_utf8_lossy(&message.payload).into_owned());

                let sent = tokio::select! {
                    () = cancel.cancelled() => break DirOutcome::Cancelled,
                    sent = tx.send(message) => sent,
                };
                if let Err(e) = sent {
                    break DirOutcome::Error(e.to_string());
                }
                if bytes > 0 {
                    if let Some(probe) = &probe {
                        probe.add(bytes);
                    }
                }
                if terminal {
                    break match failure {
                        Some(message) => DirOutcome::Error(message),
                        None => DirOutcome::Eof,
                    };
                }
            }
            Ok(None) => break DirOutcome::Eof,
            Err(e) => break DirOutcome::Error(e.to_string()),
        }
    };

    // Propagate EOF to our write side's peer, then unblock the other loop.
    let _ = tx.close().await;
    cancel.cancel();
    trace!(dir, outcome = %outcome, "copy loop finished");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ConsumptionMetrics;
    use std::time::Duration;
    use tokio::time::timeout;
    use tunnel_splice_transport::{mock_stream_pair, MockTunnelStream};
    use tunnel_splice_wire::{ConnId, TunnelMessage};

    fn pair(conn: &[u8], near: &str, far: &str) -> (MockTunnelStream, MockTunnelStream) {
        mock_stream_pair(ConnId::new(conn), near.into(), far.into())
    }

    fn started_pipe(
        a: MockTunnelStream,
        b: MockTunnelStream,
        probes: PipeProbes,
    ) -> (BidiPipe, ActiveGauge, CancellationToken, CancellationToken) {
        let gauge = ActiveGauge::new();
        let pipe = BidiPipe::new("test pipe".into(), gauge.clone());
        let done_a = CancellationToken::new();
        let done_b = CancellationToken::new();
        pipe.start(a, b, probes, (done_a.clone(), done_b.clone()));
        (pipe, gauge, done_a, done_b)
    }

    #[tokio::test]
    async fn frames_cross_and_probes_count() {
        let (a_mgr, a_peer) = pair(b"p1", "client-1", "manager");
        let (b_mgr, b_peer) = pair(b"p1", "agent:1", "manager");

        let metrics = ConsumptionMetrics::new();
        let probes = PipeProbes {
            a_to_b: Some(metrics.from_client_probe()),
            b_to_a: Some(metrics.to_client_probe()),
        };
        let (pipe, gauge, _da, _db) = started_pipe(a_mgr, b_mgr, probes);
        assert_eq!(pipe.state(), PipeState::Started);
        assert_eq!(gauge.current(), 1);

        let (mut a_rx, mut a_tx) = a_peer.into_split();
        let (mut b_rx, mut b_tx) = b_peer.into_split();

        a_tx.send(TunnelMessage::data(b"from client".to_vec()))
            .await
            .expect("send");
        let got = b_rx.recv().await.expect("recv").expect("frame");
        assert_eq!(got.payload, b"from client");

        b_tx.send(TunnelMessage::data(b"to client!".to_vec()))
            .await
            .expect("send");
        let got = a_rx.recv().await.expect("recv").expect("frame");
        assert_eq!(got.payload, b"to client!");

        // Client half finishes; the whole pipe unwinds.
        a_tx.send(TunnelMessage::eof()).await.expect("send");
        timeout(Duration::from_secs(1), pipe.closed())
            .await
            .expect("pipe should close");
        assert_eq!(pipe.state(), PipeState::Closed);
        assert_eq!(gauge.current(), 0);

        // The agent half saw the EOF frame before its stream ended.
        let got = b_rx.recv().await.expect("recv").expect("frame");
        assert_eq!(got.code, ControlCode::Eof);
        assert_eq!(b_rx.recv().await.expect("recv"), None);

        // Counters are settled and stay readable after close.
        assert_eq!(metrics.from_client_bytes(), 11);
        assert_eq!(metrics.to_client_bytes(), 10);
    }

    #[tokio::test]
    async fn transport_error_tears_down() {
        let (a_mgr, a_peer) = pair(b"p2", "client-1", "manager");
        let (b_mgr, _b_peer) = pair(b"p2", "agent:1", "manager");

        let (pipe, gauge, _da, _db) = started_pipe(a_mgr, b_mgr, PipeProbes::default());

        a_peer.reset(9);
        timeout(Duration::from_secs(1), pipe.closed())
            .await
            .expect("pipe should close");
        assert!(pipe.is_closed());
        assert_eq!(gauge.current(), 0);
    }

    #[tokio::test]
    async fn session_cancel_tears_down() {
        let (a_mgr, _a_peer) = pair(b"p3", "client-1", "manager");
        let (b_mgr, _b_peer) = pair(b"p3", "agent:1", "manager");

        let (pipe, _gauge, done_a, _db) = started_pipe(a_mgr, b_mgr, PipeProbes::default());

        done_a.cancel();
        timeout(Duration::from_secs(1), pipe.closed())
            .await
            .expect("pipe should close");
        assert!(pipe.is_closed());
    }

    #[tokio::test]
    async fn manual_close_is_idempotent() {
        let (a_mgr, _a_peer) = pair(b"p4", "client-1", "manager");
        let (b_mgr, _b_peer) = pair(b"p4", "agent:1", "manager");

        let (pipe, _gauge, _da, _db) = started_pipe(a_mgr, b_mgr, PipeProbes::default());

        pipe.close();
        pipe.close();
        timeout(Duration::from_secs(1), pipe.closed())
            .await
            .expect("pipe should close");
        assert!(pipe.is_closed());
    }

    #[tokio::test]
    async fn never_started_pipe_closes_directly() {
        let gauge = ActiveGauge::new();
        let pipe = BidiPipe::new("unstarted".into(), gauge.clone());

        pipe.close();
        timeout(Duration::from_secs(1), pipe.closed())
            .await
            .expect("pipe should close");
        assert_eq!(pipe.state(), PipeState::Closed);
        assert_eq!(gauge.current(), 0);
    }

    #[test]
    fn clones_are_the_same_pipe() {
        let pipe = BidiPipe::new("identity".into(), ActiveGauge::new());
        let other = BidiPipe::new("identity".into(), ActiveGauge::new());
        assert!(pipe.same_pipe(&pipe.clone()));
        assert!(!pipe.same_pipe(&other));
    }
}
