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

//! DNS lookup conduit for agent sessions.
//!
//! Agents cannot resolve workstation-side names themselves; lookups travel
//! agent → manager → client and the answers come back by correlation id.
//! Each agent session owns one conduit: a queue of outbound requests feeding
//! the agent's long poll, and a map of pending single-shot response
//! channels.

use crate::Error;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tunnel_splice_wire::{DnsRequest, DnsResponse};

#[derive(Debug, Default)]
struct Pending {
    responses: HashMap<String, oneshot::Sender<DnsResponse>>,
    closed: bool,
}

/// Request/response correlation channel for one agent session's lookups.
#[derive(Debug)]
pub struct DnsConduit {
    requests_tx: mpsc::Sender<DnsRequest>,
    watch: Mutex<Option<DnsWatch>>,
    pending: Mutex<Pending>,
    done: CancellationToken,
}

impl DnsConduit {
    pub(crate) fn new(done: CancellationToken) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(1);
        Self {
            requests_tx,
            watch: Mutex::new(Some(DnsWatch {
                rx: requests_rx,
                done: done.clone(),
            })),
            pending: Mutex::new(Pending::default()),
            done,
        }
    }

    /// Queues a lookup toward the agent and returns the channel its answer
    /// will arrive on.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Cancelled`] if the session is done, or
    /// [`Error::Internal`] if the correlation id is already in flight.
    pub async fn enqueue_request(
        &self,
        request: DnsRequest,
    ) -> Result<oneshot::Receiver<DnsResponse>, Error> {
        let id = request.id.clone();
        let (response_tx, response_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap();
            if pending.closed {
                return Err(Error::Cancelled);
            }
            if pending.responses.contains_key(&id) {
                return Err(Error::internal(format!(
                    "duplicate dns correlation id {id}"
                )));
            }
            pending.responses.insert(id.clone(), response_tx);
        }

        let queued = tokio::select! {
            biased;
            () = self.done.cancelled() => Err(Error::Cancelled),
            permit = self.requests_tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(request);
                    Ok(())
                }
                Err(_) => Err(Error::Cancelled),
            },
        };

        if let Err(e) = queued {
            self.pending.lock().unwrap().responses.remove(&id);
            return Err(e);
        }

        debug!(id = %id, "dns request queued");
        Ok(response_rx)
    }

    /// Takes the long-poll endpoint. Yields `Some` exactly once.
    pub fn take_watch(&self) -> Option<DnsWatch> {
        self.watch.lock().unwrap().take()
    }

    /// Correlates an answer back to its waiting lookup.
    ///
    /// An answer for an unknown id is logged and dropped; the per-request
    /// channel is closed by the delivery itself.
    pub fn deliver_response(&self, response: DnsResponse) {
        let waiter = self.pending.lock().unwrap().responses.remove(&response.id);
        match waiter {
            Some(tx) => {
                if tx.send(response).is_err() {
                    debug!("dns waiter gone before delivery");
                }
            }
            None => debug!(id = %response.id, "dropping dns response for unknown id"),
        }
    }

    /// Number of lookups still awaiting answers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().responses.len()
    }

    /// Fails every pending lookup and refuses new ones. Called on session
    /// cancel; the request queue is closed by the session's done signal.
    pub(crate) fn close(&self) {
        let mut pending = self.pending.lock().unwrap();
        pending.closed = true;
        // Dropping the senders unblocks every waiter with a closed channel.
        pending.responses.clear();
    }
}

/// Backend of the agent's DNS long poll.
#[derive(Debug)]
pub struct DnsWatch {
    rx: mpsc::Receiver<DnsRequest>,
    done: CancellationToken,
}

impl DnsWatch {
    /// Waits for the next lookup to forward to the agent.
    ///
    /// Returns `None` once the session is cancelled.
    pub async fn next(&mut self) -> Option<DnsRequest> {
        tokio::select! {
            biased;
            () = self.done.cancelled() => None,
            request = self.rx.recv() => request,
        }
    }
}
