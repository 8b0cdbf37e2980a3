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

// Mutex::lock().unwrap() is the standard pattern in Rust. The lock only fails
// if the mutex is poisoned (a thread panicked while holding it), which indicates
// a bug elsewhere that should propagate. We also suppress the "missing # Panics"
// warning since these are not user-actionable panics.
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

//! Session state and the rendezvous operations.
//!
//! A [`Session`] is one long-lived registered participant: either a
//! workstation-side client or a workload-side agent. The session owns the
//! rendezvous machinery for its tunneled connections: a waiting-map of
//! half-streams that have asked the session's owner to dial, the outbound
//! dial queue those requests travel on, and the done signal every pending
//! operation listens to.

use crate::dial::{dial_channel, DialQueue, DialWatch};
use crate::dns::DnsConduit;
use crate::metrics::{ActiveGauge, ConsumptionMetrics};
use crate::pipe::{BidiPipe, PipeProbes};
use crate::Error;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use tunnel_splice_transport::TunnelStream;
use tunnel_splice_wire::{ConnId, DialRequest, SessionId};

/// Discriminates the two session classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Workstation-side daemon that originates intercepts.
    Client,
    /// Workload sidecar that accepts tunneled connections and resolves
    /// in-cluster DNS.
    Agent,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// A half-stream parked in the waiting-map until its counterpart arrives.
struct WaitSlot<S> {
    stream: S,
    /// Done signal of the session that registered the slot.
    caller: CancellationToken,
    /// Single-shot endpoint delivery channel back to the waiting caller.
    pipe_tx: oneshot::Sender<BidiPipe>,
}

/// Mutable session state, guarded by the session's own lock.
struct Registered<S> {
    last_marked: Instant,
    waiting: HashMap<ConnId, WaitSlot<S>>,
    closed: bool,
}

/// One registered session.
///
/// The registry hands sessions out as `Arc<Session<S>>`; all state mutation
/// goes through the session's own lock, never the registry's.
pub struct Session<S: TunnelStream> {
    id: SessionId,
    kind: SessionKind,
    created_at: Instant,
    done: CancellationToken,
    default_dial_timeout: Duration,
    state: Mutex<Registered<S>>,
    dial_queue: DialQueue,
    dial_watch: Mutex<Option<DialWatch>>,
    consumption: Option<ConsumptionMetrics>,
    dns: Option<DnsConduit>,
}

impl<S: TunnelStream> Session<S> {
    pub(crate) fn new(
        id: SessionId,
        kind: SessionKind,
        now: Instant,
        default_dial_timeout: Duration,
    ) -> Arc<Self> {
        let done = CancellationToken::new();
        let (dial_queue, dial_watch) = dial_channel(done.clone());
        Arc::new(Self {
            id,
            kind,
            created_at: now,
            default_dial_timeout,
            state: Mutex::new(Registered {
                last_marked: now,
                waiting: HashMap::new(),
                closed: false,
            }),
            dial_queue,
            dial_watch: Mutex::new(Some(dial_watch)),
            consumption: (kind == SessionKind::Client).then(ConsumptionMetrics::new),
            dns: (kind == SessionKind::Agent).then(|| DnsConduit::new(done.clone())),
            done,
        })
    }

    /// The session's identifier.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The session class.
    #[must_use]
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// When the session was opened.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// The session's multi-consumer done signal.
    #[must_use]
    pub fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    /// Returns true once the session has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Per-client traffic counters; `None` for agent sessions.
    #[must_use]
    pub fn consumption_metrics(&self) -> Option<&ConsumptionMetrics> {
        self.consumption.as_ref()
    }

    /// DNS lookup conduit; `None` for client sessions.
    #[must_use]
    pub fn dns(&self) -> Option<&DnsConduit> {
        self.dns.as_ref()
    }

    /// Takes the dial long-poll endpoint. Yields `Some` exactly once.
    pub fn take_dial_watch(&self) -> Option<DialWatch> {
        self.dial_watch.lock().unwrap().take()
    }

    /// Timestamp of the most recent heartbeat.
    #[must_use]
    pub fn last_marked(&self) -> Instant {
        self.state.lock().unwrap().last_marked
    }

    /// Number of half-streams awaiting rendezvous.
    #[must_use]
    pub fn rendezvous_count(&self) -> usize {
        self.state.lock().unwrap().waiting.len()
    }

    /// Refreshes the heartbeat timestamp. The timestamp never moves
    /// backwards.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Cancelled`] once the session is done.
    pub(crate) fn mark(&self, now: Instant) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::Cancelled);
        }
        if now > state.last_marked {
            state.last_marked = now;
        }
        Ok(())
    }

    pub(crate) fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.last_marked()) > ttl
    }

    /// Terminates the session: fires the done signal, closes all owned
    /// queues, and fails every pending rendezvous with a cancellation.
    ///
    /// Safe to call concurrently; every call after the first is a no-op.
    pub fn cancel(&self) {
        let drained = {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.waiting)
        };

        info!(session = %self.id, waiters = drained.len(), "session cancelled");
        // Done fires first so blocked dispatchers and long polls unwind
        // before the waiters observe their dropped endpoint channels.
        self.done.cancel();
        drop(drained);
        if let Some(dns) = &self.dns {
            dns.close();
        }
    }

    /// Session id of the half that registered a pending rendezvous for
    /// `conn_id`, if any.
    #[must_use]
    pub fn awaiting_owner(&self, conn_id: &ConnId) -> Option<SessionId> {
        self.state
            .lock()
            .unwrap()
            .waiting
            .get(conn_id)
            .map(|slot| slot.stream.info().session_id.clone())
    }

    /// Registers `stream` as waiting for its counterpart, asks this
    /// session's owner to dial, and suspends until the matching
    /// [`on_connect`](Self::on_connect) arrives.
    ///
    /// `caller` is the done signal of the session that owns `stream`; the
    /// rendezvous aborts if either session terminates. The deadline is the
    /// stream's dial timeout plus its round-trip latency hint.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyExists`] if a rendezvous for the stream's
    ///   connection is already pending here.
    /// - [`Error::Cancelled`] if either session terminates first.
    /// - [`Error::DeadlineExceeded`] if no counterpart arrives in time.
    #[instrument(skip_all, fields(session = %self.id, conn = %stream.info().conn_id))]
    pub async fn establish_bidi_pipe(
        &self,
        stream: S,
        caller: CancellationToken,
    ) -> Result<BidiPipe, Error> {
        let info = stream.info().clone();
        let conn_id = info.conn_id.clone();
        let dial_timeout = if info.dial_timeout.is_zero() {
            self.default_dial_timeout
        } else {
            info.dial_timeout
        };

        let (pipe_tx, pipe_rx) = oneshot::channel();
        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(Error::Cancelled);
            }
            match state.waiting.entry(conn_id.clone()) {
                Entry::Occupied(_) => return Err(Error::AlreadyExists(conn_id)),
                Entry::Vacant(vacant) => {
                    vacant.insert(WaitSlot {
                        stream,
                        caller: caller.clone(),
                        pipe_tx,
                    });
                }
            }
        }
        debug!("rendezvous slot registered");

        let request = DialRequest::new(conn_id.clone(), info.roundtrip_latency, dial_timeout)
            .with_trace_context(info.trace_context.clone());
        if let Err(e) = self.dial_queue.dispatch(request).await {
            self.remove_waiter(&conn_id);
            return Err(e);
        }

        // The peer gets its dial budget plus the round trip back to us.
        let deadline = dial_timeout + info.roundtrip_latency;
        tokio::select! {
            () = tokio::time::sleep(deadline) => {
                self.remove_waiter(&conn_id);
                warn!(?deadline, "rendezvous deadline elapsed");
                Err(Error::DeadlineExceeded)
            }
            () = self.done.cancelled() => {
                self.remove_waiter(&conn_id);
                Err(Error::Cancelled)
            }
            () = caller.cancelled() => {
                self.remove_waiter(&conn_id);
                Err(Error::Cancelled)
            }
            pipe = pipe_rx => match pipe {
                Ok(pipe) => Ok(pipe),
                // Sender dropped: the session drained the slot while
                // cancelling.
                Err(_) => Err(Error::Cancelled),
            }
        }
    }

    /// Accepts an arriving stream and, if a matching rendezvous is pending,
    /// splices the two halves into a started [`BidiPipe`].
    ///
    /// Returns `Ok(None)` when nothing is waiting for the stream's
    /// connection id: the stream is spontaneous and the caller should close
    /// it. The same pipe handle is returned here and delivered to the
    /// waiting [`establish_bidi_pipe`](Self::establish_bidi_pipe) call.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Cancelled`] if the waiter disappeared before the
    /// pipe could be delivered; the pipe is torn down before returning.
    #[instrument(skip_all, fields(session = %self.id, conn = %stream.info().conn_id))]
    pub fn on_connect(
        &self,
        stream: S,
        gauge: &ActiveGauge,
        metrics: Option<&ConsumptionMetrics>,
    ) -> Result<Option<BidiPipe>, Error> {
        let conn_id = stream.info().conn_id.clone();
        let slot = self.state.lock().unwrap().waiting.remove(&conn_id);
        let Some(slot) = slot else {
            debug!("no rendezvous pending for stream");
            return Ok(None);
        };

        let name = format!(
            "{conn_id}: session {} -> {}",
            slot.stream.info().session_id,
            stream.info().session_id,
        );
        let probes = metrics.map_or_else(PipeProbes::default, |m| PipeProbes {
            a_to_b: Some(m.from_client_probe()),
            b_to_a: Some(m.to_client_probe()),
        });

        let pipe = BidiPipe::new(name, gauge.clone());
        pipe.start(
            slot.stream,
            stream,
            probes,
            (slot.caller, self.done.clone()),
        );

        if slot.pipe_tx.send(pipe.clone()).is_err() {
            // The waiter left between slot removal and delivery, either by
            // deadline or cancellation.
            warn!("rendezvous waiter gone; tearing down pipe");
            pipe.close();
            return Err(Error::Cancelled);
        }
        info!(pipe = %pipe.name(), "bidirectional pipe established");
        Ok(Some(pipe))
    }

    fn remove_waiter(&self, conn_id: &ConnId) {
        self.state.lock().unwrap().waiting.remove(conn_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;
    use tunnel_splice_transport::{mock_stream_pair, MessageReader, MessageWriter, MockTunnelStream};
    use tunnel_splice_wire::TunnelMessage;

    fn agent_session() -> Arc<Session<MockTunnelStream>> {
        Session::new(
            "agent:1".into(),
            SessionKind::Agent,
            Instant::now(),
            Duration::from_secs(5),
        )
    }

    fn pair(conn: &[u8], session: &str) -> (MockTunnelStream, MockTunnelStream) {
        mock_stream_pair(ConnId::new(conn), session.into(), session.into())
    }

    #[tokio::test]
    async fn happy_rendezvous_returns_the_same_pipe() {
        let session = agent_session();
        let mut watch = session.take_dial_watch().expect("watch");

        let (c_mgr, c_peer) = pair(b"\xab", "client-1");
        let establishing = {
            let session = Arc::clone(&session);
            let caller = CancellationToken::new();
            tokio::spawn(async move { session.establish_bidi_pipe(c_mgr, caller).await })
        };

        let request = watch.next().await.expect("dial request");
        assert_eq!(request.conn_id, ConnId::new(b"\xab".as_slice()));

        let (a_mgr, a_peer) = pair(b"\xab", "agent:1");
        let gauge = ActiveGauge::new();
        let metrics = ConsumptionMetrics::new();
        let agent_pipe = session
            .on_connect(a_mgr, &gauge, Some(&metrics))
            .expect("on_connect")
            .expect("pipe");

        let client_pipe = establishing
            .await
            .expect("task")
            .expect("establish should succeed");
        assert!(client_pipe.same_pipe(&agent_pipe));
        assert_eq!(session.rendezvous_count(), 0);

        // Bytes written by the client arrive at the agent in order.
        let (_c_rx, mut c_tx) = c_peer.into_split();
        let (mut a_rx, _a_tx) = a_peer.into_split();
        for chunk in [&b"first "[..], &b"second "[..], &b"third"[..]] {
            c_tx.send(TunnelMessage::data(chunk.to_vec()))
                .await
                .expect("send");
        }
        let mut seen = Vec::new();
        for _ in 0..3 {
            let frame = a_rx.recv().await.expect("recv").expect("frame");
            seen.extend_from_slice(&frame.payload);
        }
        assert_eq!(seen, b"first second third");

        c_tx.send(TunnelMessage::eof()).await.expect("send");
        timeout(Duration::from_secs(1), client_pipe.closed())
            .await
            .expect("pipe should close");
        assert_eq!(gauge.current(), 0);
        assert_eq!(metrics.from_client_bytes(), seen.len() as u64);
        assert_eq!(metrics.to_client_bytes(), 0);
    }

    #[tokio::test]
    async fn dial_timeout_removes_the_slot() {
        let session = agent_session();
        let _watch = session.take_dial_watch();

        let (c_mgr, _c_peer) = pair(b"\xcd", "client-1");
        let c_mgr = c_mgr.with_dial_timeout(Duration::from_millis(100));

        let result = session
            .establish_bidi_pipe(c_mgr, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
        assert_eq!(session.rendezvous_count(), 0);
    }

    #[tokio::test]
    async fn cancel_mid_wait_fails_the_pending_establish() {
        let session = agent_session();
        let mut watch = session.take_dial_watch().expect("watch");

        let (c_mgr, _c_peer) = pair(b"\xef", "client-1");
        let establishing = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .establish_bidi_pipe(c_mgr, CancellationToken::new())
                    .await
            })
        };

        // The slot is registered once the dial request is observable.
        assert!(watch.next().await.is_some());
        session.cancel();

        let result = timeout(Duration::from_secs(1), establishing)
            .await
            .expect("bounded")
            .expect("task");
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(session.rendezvous_count(), 0);
    }

    #[tokio::test]
    async fn caller_cancellation_aborts_the_rendezvous() {
        let session = agent_session();
        let mut watch = session.take_dial_watch().expect("watch");
        let caller = CancellationToken::new();

        let (c_mgr, _c_peer) = pair(b"\x31", "client-1");
        let establishing = {
            let session = Arc::clone(&session);
            let caller = caller.clone();
            tokio::spawn(async move { session.establish_bidi_pipe(c_mgr, caller).await })
        };

        assert!(watch.next().await.is_some());
        caller.cancel();

        let result = timeout(Duration::from_secs(1), establishing)
            .await
            .expect("bounded")
            .expect("task");
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!session.is_cancelled(), "only the caller went away");
        assert_eq!(session.rendezvous_count(), 0);
    }

    #[tokio::test]
    async fn orphan_on_connect_returns_none() {
        let session = agent_session();
        let gauge = ActiveGauge::new();

        let (a_mgr, _a_peer) = pair(b"\x11", "agent:1");
        let result = session.on_connect(a_mgr, &gauge, None).expect("on_connect");
        assert!(result.is_none());
        assert_eq!(gauge.current(), 0);
    }

    #[tokio::test]
    async fn duplicate_registration_fails_and_leaves_the_first() {
        let session = agent_session();
        let mut watch = session.take_dial_watch().expect("watch");

        let (first, _first_peer) = pair(b"\x22", "client-1");
        let establishing = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .establish_bidi_pipe(first, CancellationToken::new())
                    .await
            })
        };
        assert!(watch.next().await.is_some());

        let (second, _second_peer) = pair(b"\x22", "client-1");
        let result = session
            .establish_bidi_pipe(second, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert_eq!(session.rendezvous_count(), 1, "first waiter unaffected");

        session.cancel();
        let result = establishing.await.expect("task");
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn establish_on_cancelled_session_fails_fast() {
        let session = agent_session();
        session.cancel();

        let (c_mgr, _c_peer) = pair(b"\x41", "client-1");
        let result = session
            .establish_bidi_pipe(c_mgr, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_closes_the_dns_conduit() {
        let session = agent_session();
        session.cancel();
        session.cancel();
        session.cancel();
        assert!(session.is_cancelled());

        let dns = session.dns().expect("agent conduit");
        let result = dns
            .enqueue_request(tunnel_splice_wire::DnsRequest::new("q", "svc", 1))
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn mark_is_monotonic_and_fails_after_cancel() {
        let session = agent_session();
        let now = Instant::now();

        session.mark(now).expect("mark");
        assert_eq!(session.last_marked(), now);

        // An older timestamp never rewinds the clock.
        session.mark(now - Duration::from_secs(1)).expect("mark");
        assert_eq!(session.last_marked(), now);

        session.cancel();
        assert!(matches!(
            session.mark(Instant::now()),
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn awaiting_owner_names_the_registering_session() {
        let session = agent_session();
        let mut watch = session.take_dial_watch().expect("watch");

        let (c_mgr, _c_peer) = pair(b"\x51", "client-7");
        let _establishing = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .establish_bidi_pipe(c_mgr, CancellationToken::new())
                    .await
            })
        };
        assert!(watch.next().await.is_some());

        assert_eq!(
            session.awaiting_owner(&ConnId::new(b"\x51".as_slice())),
            Some(SessionId::from("client-7"))
        );
        assert_eq!(session.awaiting_owner(&ConnId::new(b"\x52".as_slice())), None);
        session.cancel();
    }

    #[test]
    fn kinds_allocate_their_feature_blocks() {
        let client: Arc<Session<MockTunnelStream>> = Session::new(
            "client-1".into(),
            SessionKind::Client,
            Instant::now(),
            Duration::from_secs(5),
        );
        assert!(client.consumption_metrics().is_some());
        assert!(client.dns().is_none());

        let agent = agent_session();
        assert!(agent.consumption_metrics().is_none());
        assert!(agent.dns().is_some());
    }
}
