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

//! Framed byte-stream realization of the half-stream traits.
//!
//! Wraps any `AsyncRead`/`AsyncWrite` pair and speaks length-prefixed,
//! codec-encoded [`TunnelMessage`] frames over it. This is how embeddings
//! without a message-native transport (plain TCP, a QUIC stream, a test
//! duplex) join the brokerage.

use crate::error::TransportError;
use crate::traits::{MessageReader, MessageWriter, StreamInfo, TunnelStream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{trace, warn};
use tunnel_splice_wire::{BincodeCodec, Codec, FrameReader, FrameWriter, TunnelMessage};

const READ_CHUNK: usize = 4096;

/// A [`TunnelStream`] over a raw byte-stream pair.
pub struct FramedStream<R, W> {
    info: StreamInfo,
    read: R,
    write: W,
}

impl<R, W> FramedStream<R, W>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    /// Creates a framed stream over the given byte-stream halves.
    pub fn new(info: StreamInfo, read: R, write: W) -> Self {
        Self { info, read, write }
    }
}

impl<R, W> TunnelStream for FramedStream<R, W>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    type Reader = FramedReader<R>;
    type Writer = FramedWriter<W>;

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        (FramedReader::new(self.read), FramedWriter::new(self.write))
    }
}

/// Reads codec-encoded frames off a byte stream.
pub struct FramedReader<R> {
    read: R,
    frames: FrameReader,
    codec: BincodeCodec,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Send + Unpin + 'static> FramedReader<R> {
    /// Creates a framed reader over the byte stream's read half.
    pub fn new(read: R) -> Self {
        Self {
            read,
            frames: FrameReader::with_capacity(READ_CHUNK),
            codec: BincodeCodec::new(),
            chunk: vec![0u8; READ_CHUNK],
        }
    }
}

impl<R: AsyncRead + Send + Unpin + 'static> MessageReader for FramedReader<R> {
    type Error = TransportError;

    async fn recv(&mut self) -> Result<Option<TunnelMessage>, Self::Error> {
        loop {
            match self.frames.next_frame() {
                Ok(Some(frame)) => {
                    let message: TunnelMessage = self.codec.decode(&frame)?;
                    trace!(code = %message.code, len = frame.len(), "received frame");
                    return Ok(Some(message));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "frame parse error");
                    return Err(e.into());
                }
            }

            let n = self.read.read(&mut self.chunk).await?;
            if n == 0 {
                if self.frames.buffered_len() > 0 {
                    warn!(
                        buffered = self.frames.buffered_len(),
                        "byte stream closed mid-frame"
                    );
                    return Err(TransportError::PartialFrame(self.frames.buffered_len()));
                }
                trace!("byte stream closed");
                return Ok(None);
            }
            self.frames.extend(&self.chunk[..n]);
        }
    }
}

/// Writes codec-encoded frames onto a byte stream.
pub struct FramedWriter<W> {
    write: W,
    frames: FrameWriter,
    codec: BincodeCodec,
}

impl<W: AsyncWrite + Send + Unpin + 'static> FramedWriter<W> {
    /// Creates a framed writer over the byte stream's write half.
    pub fn new(write: W) -> Self {
        Self {
            write,
            frames: FrameWriter::with_capacity(READ_CHUNK),
            codec: BincodeCodec::new(),
        }
    }
}

impl<W: AsyncWrite + Send + Unpin + 'static> MessageWriter for FramedWriter<W> {
    type Error = TransportError;

    async fn send(&mut self, message: TunnelMessage) -> Result<(), Self::Error> {
        let encoded = self.codec.encode(&message)?;
        self.frames.push_frame(&encoded)?;
        let bytes = self.frames.take_bytes();
        trace!(code = %message.code, len = bytes.len(), "sending frame");
        self.write.write_all(&bytes).await?;
        self.write.flush().await?;
        Ok(())
    }

    async fn close(mut self) -> Result<(), Self::Error> {
        self.write.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tunnel_splice_wire::{encode_frame, ConnId, SessionId};

    fn test_info(session: &str) -> StreamInfo {
        StreamInfo::new(ConnId::new(b"fc".as_slice()), SessionId::from(session))
    }

    #[tokio::test]
    async fn frames_cross_a_duplex_pair() {
        let (near, far) = tokio::io::duplex(256);
        let (near_read, near_write) = tokio::io::split(near);
        let (far_read, far_write) = tokio::io::split(far);

        let near = FramedStream::new(test_info("client-1"), near_read, near_write);
        let far = FramedStream::new(test_info("agent:1"), far_read, far_write);

        let (_near_rx, mut near_tx) = near.into_split();
        let (mut far_rx, _far_tx) = far.into_split();

        near_tx
            .send(TunnelMessage::open(
                ConnId::new(b"fc".as_slice()),
                "client-1".into(),
            ))
            .await
            .expect("send should succeed");
        near_tx
            .send(TunnelMessage::data(b"tunnel bytes".to_vec()))
            .await
            .expect("send should succeed");

        let open = far_rx
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have frame");
        assert_eq!(open.conn_id, Some(ConnId::new(b"fc".as_slice())));

        let data = far_rx
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have frame");
        assert_eq!(data.payload, b"tunnel bytes");
    }

    #[tokio::test]
    async fn shutdown_delivers_eof() {
        let (near, far) = tokio::io::duplex(256);
        let (near_read, near_write) = tokio::io::split(near);
        let (far_read, far_write) = tokio::io::split(far);

        let near = FramedStream::new(test_info("client-1"), near_read, near_write);
        let far = FramedStream::new(test_info("agent:1"), far_read, far_write);

        let (_near_rx, near_tx) = near.into_split();
        let (mut far_rx, _far_tx) = far.into_split();

        near_tx.close().await.expect("close should succeed");
        drop(_near_rx);
        assert!(far_rx.recv().await.expect("recv should succeed").is_none());
    }

    #[tokio::test]
    async fn close_mid_frame_is_an_error() {
        let (near, far) = tokio::io::duplex(256);
        let (_near_read, mut near_write) = tokio::io::split(near);
        let (far_read, _far_write) = tokio::io::split(far);

        // A valid frame header plus half the payload, then shutdown.
        let frame = encode_frame(b"truncated payload").expect("encode should succeed");
        near_write
            .write_all(&frame[..frame.len() / 2])
            .await
            .expect("write should succeed");
        near_write.shutdown().await.expect("shutdown should succeed");

        let mut far_rx = FramedReader::new(far_read);
        assert!(matches!(
            far_rx.recv().await,
            Err(TransportError::PartialFrame(_))
        ));
    }
}
