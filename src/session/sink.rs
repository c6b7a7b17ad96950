//! Connection-side write targets for streaming sessions

use bytes::Bytes;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Where a session writes its chunks
///
/// A sink wraps one already-prepared connection (headers sent, streaming
/// mode entered). Any error from `write_chunk` or `drain` means the client is
/// gone; the session stops and never writes to the sink again.
#[async_trait::async_trait]
pub trait ChunkSink: Send + Sync {
    /// Queue one chunk for the client
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()>;

    /// Wait until previously written chunks have been taken by the transport
    ///
    /// This is where a slow client pushes back on its own session.
    async fn drain(&mut self) -> io::Result<()>;

    /// Resolves once the peer is known to be gone
    ///
    /// Sinks that cannot tell ahead of the next write never resolve.
    async fn closed(&self) {
        futures::future::pending::<()>().await
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}

/// Sink feeding a bounded channel that backs an HTTP response body
///
/// The HTTP stack pulls from the receiver only when the socket can take more
/// data, so a capacity of one makes `drain` wait for the client.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    /// Create a sink and the receiver the response body reads from
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl ChunkSink for ChannelSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.tx.send(chunk).await.map_err(|_| disconnected())
    }

    async fn drain(&mut self) -> io::Result<()> {
        // The permit is released unused; only the wait matters.
        self.tx.reserve().await.map(drop).map_err(|_| disconnected())
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Sink over any async byte writer, e.g. a raw `TcpStream`
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait::async_trait]
impl<W> ChunkSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + Sync,
{
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.writer.write_all(&chunk).await
    }

    async fn drain(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn channel_drain_waits_for_the_reader() {
        let (mut sink, mut rx) = ChannelSink::channel(1);

        sink.write_chunk(Bytes::from_static(b"one")).await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(30), sink.drain()).await;
        assert!(blocked.is_err(), "drain must wait while the chunk is unread");

        assert_eq!(rx.recv().await.unwrap().as_ref(), b"one");
        tokio::time::timeout(Duration::from_secs(1), sink.drain()).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn channel_reports_disconnect() {
        let (mut sink, rx) = ChannelSink::channel(1);
        drop(rx);

        tokio::time::timeout(Duration::from_secs(1), sink.closed()).await.unwrap();
        let err = sink.write_chunk(Bytes::from_static(b"late")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(sink.drain().await.is_err());
    }

    #[tokio::test]
    async fn writer_sink_writes_and_detects_closed_peer() {
        let (client, mut server) = tokio::io::duplex(16);
        let mut sink = WriterSink::new(client);

        let reader = tokio::spawn(async move {
            let mut buf = vec![0u8; 40];
            server.read_exact(&mut buf).await.unwrap();
            buf
        });

        // Larger than the duplex buffer, so this only completes as the reader drains.
        let chunk = Bytes::from(vec![7u8; 40]);
        sink.write_chunk(chunk.clone()).await.unwrap();
        sink.drain().await.unwrap();
        assert_eq!(reader.await.unwrap(), chunk.to_vec());

        // The reader half was dropped with the task.
        assert!(sink.write_chunk(Bytes::from_static(b"gone")).await.is_err());
    }
}
