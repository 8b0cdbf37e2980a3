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

//! Per-session dial request hand-off.
//!
//! Each session exposes one outbound queue of [`DialRequest`]s consumed by
//! the peer's long poll. The queue holds a single slot, so a dispatcher
//! suspends until the previous request has been drained; that back-pressure
//! is deliberate and keeps the broker honest about slow peers. Requests are
//! delivered in FIFO order and never after the session is cancelled.

use crate::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tunnel_splice_wire::DialRequest;

/// Creates the queue/watch pair for one session.
pub(crate) fn dial_channel(done: CancellationToken) -> (DialQueue, DialWatch) {
    let (tx, rx) = mpsc::channel(1);
    (
        DialQueue {
            tx,
            done: done.clone(),
        },
        DialWatch { rx, done },
    )
}

/// Sending side of a session's dial queue.
#[derive(Debug, Clone)]
pub(crate) struct DialQueue {
    tx: mpsc::Sender<DialRequest>,
    done: CancellationToken,
}

impl DialQueue {
    /// Hands one request to the session's long poll.
    ///
    /// Suspends until the slot is free; fails with [`Error::Cancelled`]
    /// without blocking once the session is done.
    pub(crate) async fn dispatch(&self, request: DialRequest) -> Result<(), Error> {
        tokio::select! {
            biased;
            () = self.done.cancelled() => Err(Error::Cancelled),
            permit = self.tx.reserve() => match permit {
                Ok(permit) => {
                    debug!(conn = %request.conn_id, "dial request queued");
                    permit.send(request);
                    Ok(())
                }
                Err(_) => Err(Error::Cancelled),
            },
        }
    }
}

/// Receiving side of a session's dial queue; backend of the peer's
/// dial-watching long poll.
#[derive(Debug)]
pub struct DialWatch {
    rx: mpsc::Receiver<DialRequest>,
    done: CancellationToken,
}

impl DialWatch {
    /// Waits for the next dial request.
    ///
    /// Returns `None` once the session is cancelled, even if a request was
    /// still sitting in the queue.
    pub async fn next(&mut self) -> Option<DialRequest> {
        tokio::select! {
            biased;
            () = self.done.cancelled() => None,
            request = self.rx.recv() => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tunnel_splice_wire::ConnId;

    fn request(byte: u8) -> DialRequest {
        DialRequest::new(
            ConnId::new(vec![byte]),
            Duration::ZERO,
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn requests_arrive_in_dispatch_order() {
        let done = CancellationToken::new();
        let (queue, mut watch) = dial_channel(done);

        let producer = tokio::spawn(async move {
            for byte in 1..=4u8 {
                queue.dispatch(request(byte)).await.expect("dispatch");
            }
        });

        for byte in 1..=4u8 {
            let got = watch.next().await.expect("should deliver");
            assert_eq!(got.conn_id, ConnId::new(vec![byte]));
        }
        producer.await.expect("producer");
    }

    #[tokio::test]
    async fn dispatch_backpressures_until_drained() {
        let done = CancellationToken::new();
        let (queue, mut watch) = dial_channel(done);

        // First request takes the only slot.
        queue.dispatch(request(1)).await.expect("dispatch");

        // Second dispatch cannot complete until the watcher drains.
        let pending = tokio::time::timeout(Duration::from_millis(50), queue.dispatch(request(2)));
        assert!(pending.await.is_err(), "second dispatch should suspend");

        assert_eq!(
            watch.next().await.expect("delivered").conn_id,
            ConnId::new(vec![1])
        );
        queue.dispatch(request(2)).await.expect("dispatch");
        assert_eq!(
            watch.next().await.expect("delivered").conn_id,
            ConnId::new(vec![2])
        );
    }

    #[tokio::test]
    async fn dispatch_fails_fast_on_cancelled_session() {
        let done = CancellationToken::new();
        let (queue, _watch) = dial_channel(done.clone());

        // Fill the slot so a naive dispatch would suspend forever.
        queue.dispatch(request(1)).await.expect("dispatch");
        done.cancel();

        assert!(matches!(queue.dispatch(request(2)).await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn nothing_is_delivered_after_cancel() {
        let done = CancellationToken::new();
        let (queue, mut watch) = dial_channel(done.clone());

        queue.dispatch(request(1)).await.expect("dispatch");
        done.cancel();

        assert!(watch.next().await.is_none());
        assert!(watch.next().await.is_none());
    }
}
