//! A stream wrapper that fails stalled I/O instead of waiting forever.
//!
//! The HTTP connection is driven by hyper, which polls the transport
//! directly.  Wrapping the transport puts the gateway's own deadlines under
//! every read, write and shutdown hyper performs:
//!
//! ```text
//! poll_read         ── stalled longer than Deadlines::read     ──▶ TimedOut
//! poll_write, flush ── stalled longer than Deadlines::write    ──▶ TimedOut
//! poll_shutdown     ── stalled longer than Deadlines::shutdown ──▶ TimedOut
//! ```
//!
//! A deadline measures one stall: the timer starts at the first `Pending`
//! and is discarded as soon as the operation makes progress.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep, Sleep};

/// Per-direction stall limits for a [`DeadlineStream`].
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    pub read: Duration,
    pub write: Duration,
    pub shutdown: Duration,
}

/// Wraps a transport and bounds how long any single operation may stall.
#[derive(Debug)]
pub struct DeadlineStream<S> {
    inner: S,
    limits: Deadlines,
    read_timer: Option<Pin<Box<Sleep>>>,
    write_timer: Option<Pin<Box<Sleep>>>,
}

impl<S> DeadlineStream<S> {
    pub fn new(inner: S, limits: Deadlines) -> Self {
        Self {
            inner,
            limits,
            read_timer: None,
            write_timer: None,
        }
    }

    /// Returns the wrapped transport.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Passes `poll` through, turning a stall longer than `limit` into
/// [`io::ErrorKind::TimedOut`].
fn guard<T>(
    timer: &mut Option<Pin<Box<Sleep>>>,
    limit: Duration,
    cx: &mut Context<'_>,
    poll: Poll<io::Result<T>>,
) -> Poll<io::Result<T>> {
    match poll {
        Poll::Ready(result) => {
            *timer = None;
            Poll::Ready(result)
        }
        Poll::Pending => {
            let deadline = timer.get_or_insert_with(|| Box::pin(sleep(limit)));
            match deadline.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    *timer = None;
                    Poll::Ready(Err(io::ErrorKind::TimedOut.into()))
                }
                Poll::Pending => Poll::Pending,
            }
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for DeadlineStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        guard(&mut this.read_timer, this.limits.read, cx, poll)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeadlineStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        guard(&mut this.write_timer, this.limits.write, cx, poll)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        guard(&mut this.write_timer, this.limits.write, cx, poll)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_flush(cx);
        guard(&mut this.write_timer, this.limits.write, cx, poll)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_shutdown(cx);
        guard(&mut this.write_timer, this.limits.shutdown, cx, poll)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const LIMITS: Deadlines = Deadlines {
        read: Duration::from_secs(12),
        write: Duration::from_secs(12),
        shutdown: Duration::from_secs(6),
    };

    #[tokio::test(start_paused = true)]
    async fn test_stalled_read_times_out() {
        // Arrange: a peer that goes quiet for a minute before sending
        let mock = tokio_test::io::Builder::new()
            .wait(Duration::from_secs(60))
            .read(b"late")
            .build();
        let mut stream = DeadlineStream::new(mock, LIMITS);

        // Act
        let mut buf = [0u8; 4];
        let err = stream.read(&mut buf).await.unwrap_err();

        // Assert: the data still arrives for whoever waits without a deadline
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        let mut inner = stream.into_inner();
        inner.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_but_progressing_reads_pass() {
        let mock = tokio_test::io::Builder::new()
            .wait(Duration::from_secs(10))
            .read(b"ab")
            .wait(Duration::from_secs(10))
            .read(b"cd")
            .build();
        let mut stream = DeadlineStream::new(mock, LIMITS);

        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();

        assert_eq!(&buf, b"abcd");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_to_peer_that_never_reads_times_out() {
        // Arrange: the peer end is kept alive but never drained
        let (server, _peer) = tokio::io::duplex(1024);
        let mut stream = DeadlineStream::new(server, LIMITS);

        // Act
        let err = stream.write_all(&[0u8; 64 * 1024]).await.unwrap_err();

        // Assert
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_into_inner_returns_transport() {
        let (server, mut peer) = tokio::io::duplex(64);
        let mut stream = DeadlineStream::new(server, LIMITS);
        stream.write_all(b"hi").await.unwrap();

        let mut inner = stream.into_inner();
        inner.write_all(b"!").await.unwrap();

        let mut buf = [0u8; 3];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi!");
    }
}
