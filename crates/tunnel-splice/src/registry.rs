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

//! The process-wide session registry.
//!
//! Owns the id → session table and the operations that back the manager's
//! RPC surface: opening sessions, heartbeat marks, departure, staleness
//! reaping, and the routing wrappers that connect arriving tunnel streams
//! to the right session's rendezvous. The registry lock guards only table
//! lookups and mutations; per-session state lives behind each session's own
//! lock, and the two are never held together.

use crate::metrics::ActiveGauge;
use crate::pipe::BidiPipe;
use crate::session::{Session, SessionKind};
use crate::{Config, Error};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};
use tunnel_splice_transport::TunnelStream;
use tunnel_splice_wire::{SessionId, AGENT_SESSION_ID_PREFIX};

/// Registry of all live client and agent sessions.
pub struct SessionRegistry<S: TunnelStream> {
    config: Config,
    sessions: Mutex<HashMap<SessionId, Arc<Session<S>>>>,
    next_id: AtomicU64,
    active_tunnels: ActiveGauge,
}

impl<S: TunnelStream> SessionRegistry<S> {
    /// Creates an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            active_tunnels: ActiveGauge::new(),
        })
    }

    /// The registry's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers a new client session, marked at `now`.
    pub fn open_client(&self, now: Instant) -> Arc<Session<S>> {
        let id = SessionId::new(format!("client-{:08x}", self.next_seq()));
        self.insert(id, SessionKind::Client, now)
    }

    /// Registers a new agent session, marked at `now`.
    pub fn open_agent(&self, now: Instant) -> Arc<Session<S>> {
        let id = SessionId::new(format!("{AGENT_SESSION_ID_PREFIX}{:08x}", self.next_seq()));
        self.insert(id, SessionKind::Agent, now)
    }

    /// Looks up a session by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids.
    pub fn get(&self, id: &SessionId) -> Result<Arc<Session<S>>, Error> {
        self.sessions
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.clone()))
    }

    /// Refreshes a session's heartbeat timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids and [`Error::Cancelled`]
    /// for sessions that have already departed.
    pub fn mark(&self, id: &SessionId, now: Instant) -> Result<(), Error> {
        self.get(id)?.mark(now)
    }

    /// Removes and cancels a session.
    ///
    /// Unknown ids are a no-op, so departure and staleness reaping can race
    /// safely.
    pub fn cancel(&self, id: &SessionId) {
        let removed = self.sessions.lock().unwrap().remove(id);
        match removed {
            Some(session) => session.cancel(),
            None => debug!(session = %id, "cancel for unknown session"),
        }
    }

    /// Cancels every session that has gone more than two heartbeat
    /// intervals without a mark. Returns how many were reaped.
    pub fn reap(&self, now: Instant) -> usize {
        let ttl = self.config.stale_after();
        let snapshot: Vec<_> = self.sessions.lock().unwrap().values().cloned().collect();

        let mut reaped = 0;
        for session in snapshot {
            if session.is_stale(now, ttl) {
                debug!(session = %session.id(), "reaping stale session");
                self.cancel(session.id());
                reaped += 1;
            }
        }
        if reaped > 0 {
            info!(reaped, "stale sessions reaped");
        }
        reaped
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Returns true if no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().unwrap().is_empty()
    }

    /// Ids of all registered sessions.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.lock().unwrap().keys().cloned().collect()
    }

    /// Number of pipes currently moving bytes.
    #[must_use]
    pub fn active_tunnels(&self) -> usize {
        self.active_tunnels.current()
    }

    /// Routes a stream that wants its counterpart dialed by `peer`.
    ///
    /// The stream's own session must be registered; its done signal joins
    /// the rendezvous so either party's departure aborts the wait.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures and every
    /// [`Session::establish_bidi_pipe`] error.
    pub async fn establish_bidi_pipe(
        &self,
        peer: &SessionId,
        stream: S,
    ) -> Result<BidiPipe, Error> {
        let owner = self.get(&stream.info().session_id)?;
        let peer_session = self.get(peer)?;
        peer_session.establish_bidi_pipe(stream, owner.done()).await
    }

    /// Routes a stream arriving from `id` toward its pending rendezvous.
    ///
    /// If the waiting half belongs to a client session, that session's
    /// traffic counters are wired into the new pipe.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures and every [`Session::on_connect`] error.
    pub fn on_connect(&self, id: &SessionId, stream: S) -> Result<Option<BidiPipe>, Error> {
        let session = self.get(id)?;
        let metrics = session
            .awaiting_owner(&stream.info().conn_id)
            .and_then(|owner| self.get(&owner).ok())
            .and_then(|owner| owner.consumption_metrics().cloned());
        session.on_connect(stream, &self.active_tunnels, metrics.as_ref())
    }

    fn next_seq(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn insert(&self, id: SessionId, kind: SessionKind, now: Instant) -> Arc<Session<S>> {
        let session = Session::new(
            id.clone(),
            kind,
            now,
            self.config.default_dial_timeout,
        );
        self.sessions
            .lock()
            .unwrap()
            .insert(id.clone(), Arc::clone(&session));
        info!(session = %id, %kind, "session opened");
        session
    }
}
