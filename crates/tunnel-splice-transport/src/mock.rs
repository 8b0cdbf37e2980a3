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

//! In-memory half-stream pairs for testing.
//!
//! [`mock_stream_pair`] returns two cross-wired streams: messages sent on
//! one end arrive on the other, dropping or closing a writer delivers EOF,
//! and [`MockTunnelStream::reset`] makes the peer's reads fail the way an
//! aborted transport stream would. A reset travels in-band, so frames
//! already in flight are delivered first; once observed, the failure is
//! sticky.

use crate::traits::{MessageReader, MessageWriter, StreamInfo, TunnelStream};
use thiserror::Error;
use tokio::sync::mpsc;
use tunnel_splice_wire::{ConnId, SessionId, TunnelMessage};

/// Error type for mock stream operations.
#[derive(Debug, Error)]
pub enum MockError {
    /// The peer end has gone away.
    #[error("stream closed")]
    Closed,

    /// The peer reset its send side.
    #[error("stream reset by peer: code {0}")]
    Reset(u32),
}

#[derive(Debug)]
enum MockEvent {
    Frame(TunnelMessage),
    Reset(u32),
}

/// Creates a cross-wired pair of in-memory streams for one connection.
///
/// Both ends share `conn_id`; `near` and `far` name the sessions owning
/// each end. Timing hints start from [`StreamInfo::new`] defaults and can
/// be adjusted per end with [`MockTunnelStream::with_dial_timeout`] and
/// [`MockTunnelStream::with_roundtrip_latency`].
#[must_use]
pub fn mock_stream_pair(
    conn_id: ConnId,
    near: SessionId,
    far: SessionId,
) -> (MockTunnelStream, MockTunnelStream) {
    let (near_tx, far_rx) = mpsc::unbounded_channel();
    let (far_tx, near_rx) = mpsc::unbounded_channel();

    let near_end = MockTunnelStream {
        info: StreamInfo::new(conn_id.clone(), near),
        tx: near_tx,
        rx: near_rx,
    };

    let far_end = MockTunnelStream {
        info: StreamInfo::new(conn_id, far),
        tx: far_tx,
        rx: far_rx,
    };

    (near_end, far_end)
}

/// One end of an in-memory stream pair.
#[derive(Debug)]
pub struct MockTunnelStream {
    info: StreamInfo,
    tx: mpsc::UnboundedSender<MockEvent>,
    rx: mpsc::UnboundedReceiver<MockEvent>,
}

impl MockTunnelStream {
    /// Sets the dial timeout hint on this end.
    #[must_use]
    pub fn with_dial_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.info = self.info.with_dial_timeout(timeout);
        self
    }

    /// Sets the round-trip latency hint on this end.
    #[must_use]
    pub fn with_roundtrip_latency(mut self, latency: std::time::Duration) -> Self {
        self.info = self.info.with_roundtrip_latency(latency);
        self
    }

    /// Abruptly resets this end's send side; the peer's reads fail with
    /// [`MockError::Reset`] once delivered frames are drained.
    pub fn reset(&self, code: u32) {
        let _ = self.tx.send(MockEvent::Reset(code));
    }
}

impl TunnelStream for MockTunnelStream {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        (
            MockReader {
                rx: self.rx,
                failed: None,
            },
            MockWriter { tx: self.tx },
        )
    }
}

/// Read half of a [`MockTunnelStream`].
#[derive(Debug)]
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<MockEvent>,
    failed: Option<u32>,
}

impl MessageReader for MockReader {
    type Error = MockError;

    async fn recv(&mut self) -> Result<Option<TunnelMessage>, Self::Error> {
        if let Some(code) = self.failed {
            return Err(MockError::Reset(code));
        }
        match self.rx.recv().await {
            Some(MockEvent::Frame(message)) => Ok(Some(message)),
            Some(MockEvent::Reset(code)) => {
                self.failed = Some(code);
                Err(MockError::Reset(code))
            }
            None => Ok(None),
        }
    }
}

/// Write half of a [`MockTunnelStream`].
#[derive(Debug)]
pub struct MockWriter {
    tx: mpsc::UnboundedSender<MockEvent>,
}

impl MockWriter {
    /// Abruptly resets the send side, failing the peer's reads.
    pub fn reset(&mut self, code: u32) {
        let _ = self.tx.send(MockEvent::Reset(code));
    }
}

impl MessageWriter for MockWriter {
    type Error = MockError;

    async fn send(&mut self, message: TunnelMessage) -> Result<(), Self::Error> {
        self.tx
            .send(MockEvent::Frame(message))
            .map_err(|_| MockError::Closed)
    }

    async fn close(self) -> Result<(), Self::Error> {
        // Dropping the sender delivers EOF to the peer's reader.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(conn: &[u8]) -> (MockTunnelStream, MockTunnelStream) {
        mock_stream_pair(ConnId::new(conn), "client-1".into(), "agent:1".into())
    }

    #[tokio::test]
    async fn messages_cross_between_ends() {
        let (near, far) = pair(b"c1");

        let (mut near_rx, mut near_tx) = near.into_split();
        let (mut far_rx, mut far_tx) = far.into_split();

        near_tx
            .send(TunnelMessage::data(b"ping".to_vec()))
            .await
            .expect("send should succeed");
        let got = far_rx.recv().await.expect("recv should succeed");
        assert_eq!(got, Some(TunnelMessage::data(b"ping".to_vec())));

        far_tx
            .send(TunnelMessage::data(b"pong".to_vec()))
            .await
            .expect("send should succeed");
        let got = near_rx.recv().await.expect("recv should succeed");
        assert_eq!(got, Some(TunnelMessage::data(b"pong".to_vec())));
    }

    #[tokio::test]
    async fn closing_writer_delivers_eof() {
        let (near, far) = pair(b"c2");

        let (_near_rx, near_tx) = near.into_split();
        let (mut far_rx, _far_tx) = far.into_split();

        near_tx.close().await.expect("close should succeed");
        assert_eq!(far_rx.recv().await.expect("recv should succeed"), None);
    }

    #[tokio::test]
    async fn reset_fails_peer_reads_after_inflight_frames() {
        let (near, far) = pair(b"c3");

        let (_near_rx, mut near_tx) = near.into_split();
        near_tx
            .send(TunnelMessage::data(b"inflight".to_vec()))
            .await
            .expect("send should succeed");
        near_tx.reset(7);

        let (mut far_rx, _far_tx) = far.into_split();
        let got = far_rx.recv().await.expect("recv should succeed");
        assert_eq!(got, Some(TunnelMessage::data(b"inflight".to_vec())));

        assert!(matches!(far_rx.recv().await, Err(MockError::Reset(7))));
        // The failure is sticky.
        assert!(matches!(far_rx.recv().await, Err(MockError::Reset(7))));
    }

    #[tokio::test]
    async fn reset_wakes_a_blocked_reader() {
        let (near, far) = pair(b"c4");

        let (mut far_rx, _far_tx) = far.into_split();
        let reader = tokio::spawn(async move { far_rx.recv().await });

        tokio::task::yield_now().await;
        near.reset(3);

        let got = reader.await.expect("reader task");
        assert!(matches!(got, Err(MockError::Reset(3))));
    }

    #[tokio::test]
    async fn send_to_dropped_peer_fails() {
        let (near, far) = pair(b"c5");

        drop(far);
        let (_near_rx, mut near_tx) = near.into_split();
        assert!(matches!(
            near_tx.send(TunnelMessage::eof()).await,
            Err(MockError::Closed)
        ));
    }

    #[test]
    fn ends_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<MockTunnelStream>();
        assert_send::<MockReader>();
        assert_send::<MockWriter>();
    }
}
