//! Duplex stream abstraction
//!
//! The relay works on anything that is `AsyncRead + AsyncWrite`. Two extra
//! pieces of behaviour are layered on top:
//!
//! - an optional half-close capability, queried through
//!   [`DuplexStream::half_close`], that streams like TCP sockets provide and
//!   others (an interface bridge, in-memory pipes) simply do not;
//! - read deadlines. Tokio streams have no deadlines of their own, so
//!   [`split`] hands out a read end and a write end that share a deadline
//!   cell: the task owning the write end can bound how long the task owning
//!   the read end keeps waiting. [`DeadlineStream`] covers the single-owner
//!   case used during the handshake.

use std::future::Future;
use std::io;
use std::net::Shutdown;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Instant, Sleep};

/// A bidirectional byte stream the relay can drive
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Half-close capability of this stream, if it has one
    fn half_close(&mut self) -> Option<&mut dyn HalfClose> {
        None
    }
}

/// Independent shutdown of the read and write sides of a stream
pub trait HalfClose {
    /// Stop reading; the peer's further writes are discarded
    fn close_read(&mut self) -> io::Result<()>;

    /// Stop writing; the peer observes end-of-stream
    fn close_write(&mut self) -> io::Result<()>;
}

impl DuplexStream for TcpStream {
    fn half_close(&mut self) -> Option<&mut dyn HalfClose> {
        Some(self)
    }
}

impl HalfClose for TcpStream {
    fn close_read(&mut self) -> io::Result<()> {
        socket2::SockRef::from(&*self).shutdown(Shutdown::Read)
    }

    fn close_write(&mut self) -> io::Result<()> {
        socket2::SockRef::from(&*self).shutdown(Shutdown::Write)
    }
}

impl DuplexStream for tokio::io::DuplexStream {}

impl<S: DuplexStream> DuplexStream for DeadlineStream<S> {
    fn half_close(&mut self) -> Option<&mut dyn HalfClose> {
        self.inner.half_close()
    }
}

struct Shared<S> {
    stream: Mutex<S>,
    read_deadline: watch::Sender<Option<Instant>>,
}

impl<S> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, S> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read side of a split stream
pub struct ReadEnd<S> {
    shared: Arc<Shared<S>>,
    deadline: watch::Receiver<Option<Instant>>,
}

/// Write side of a split stream
pub struct WriteEnd<S> {
    shared: Arc<Shared<S>>,
}

/// Split a stream into ends that can be moved to different tasks
///
/// The ends share the stream behind a mutex that is only held for a single
/// poll. The stream is closed once both ends are dropped.
pub fn split<S: DuplexStream>(stream: S) -> (ReadEnd<S>, WriteEnd<S>) {
    let (read_deadline, deadline) = watch::channel(None);
    let shared = Arc::new(Shared {
        stream: Mutex::new(stream),
        read_deadline,
    });

    (
        ReadEnd {
            shared: Arc::clone(&shared),
            deadline,
        },
        WriteEnd { shared },
    )
}

impl<S: DuplexStream> ReadEnd<S> {
    /// Read into `buf`, failing with `TimedOut` once the read deadline passes
    ///
    /// A deadline set while the read is pending takes effect immediately.
    pub async fn read_with_deadline(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let current = *self.deadline.borrow_and_update();
            let expired = async {
                match current {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                result = read_shared(&self.shared, &mut *buf) => return result,
                _ = expired => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "read deadline exceeded"));
                }
                changed = self.deadline.changed() => {
                    if changed.is_err() {
                        // The sender lives in `Shared`, which this end keeps alive.
                        return read_shared(&self.shared, buf).await;
                    }
                }
            }
        }
    }

    /// Shut down the read side if the stream supports it
    ///
    /// Returns `None` when the stream has no half-close capability.
    pub fn close_read(&self) -> Option<io::Result<()>> {
        let mut stream = self.shared.lock();
        stream.half_close().map(|hc| hc.close_read())
    }

    /// Current read deadline
    pub fn read_deadline(&self) -> Option<Instant> {
        *self.deadline.borrow()
    }

    /// Watch handle that observes every change of the read deadline
    pub fn deadline_watch(&self) -> watch::Receiver<Option<Instant>> {
        self.shared.read_deadline.subscribe()
    }
}

async fn read_shared<S: DuplexStream>(shared: &Shared<S>, buf: &mut [u8]) -> io::Result<usize> {
    let mut read_buf = ReadBuf::new(buf);
    std::future::poll_fn(|cx| {
        let mut stream = shared.lock();
        Pin::new(&mut *stream).poll_read(cx, &mut read_buf)
    })
    .await?;
    Ok(read_buf.filled().len())
}

impl<S: DuplexStream> WriteEnd<S> {
    /// Shut down the write side if the stream supports it
    ///
    /// Returns `None` when the stream has no half-close capability.
    pub fn close_write(&self) -> Option<io::Result<()>> {
        let mut stream = self.shared.lock();
        stream.half_close().map(|hc| hc.close_write())
    }

    /// Bound reads on the other end of this stream
    ///
    /// `None` clears the deadline.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.shared.read_deadline.send_replace(deadline);
    }
}

impl<S: DuplexStream> AsyncRead for ReadEnd<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut stream = self.shared.lock();
        Pin::new(&mut *stream).poll_read(cx, buf)
    }
}

impl<S: DuplexStream> AsyncWrite for WriteEnd<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut stream = self.shared.lock();
        Pin::new(&mut *stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut stream = self.shared.lock();
        Pin::new(&mut *stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut stream = self.shared.lock();
        Pin::new(&mut *stream).poll_shutdown(cx)
    }
}

/// A stream whose reads and writes fail with `TimedOut` after a deadline
///
/// Mirrors a socket-level deadline: arm it before a bounded exchange, clear
/// it (or unwrap the stream) once the exchange is done.
pub struct DeadlineStream<S> {
    inner: S,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<S> DeadlineStream<S> {
    /// Wrap a stream with no deadline armed
    pub fn new(inner: S) -> Self {
        Self { inner, deadline: None }
    }

    /// Arm (or move) the deadline
    pub fn set_deadline(&mut self, at: Instant) {
        match self.deadline.as_mut() {
            Some(sleep) => sleep.as_mut().reset(at),
            None => self.deadline = Some(Box::pin(tokio::time::sleep_until(at))),
        }
    }

    /// Disarm the deadline
    pub fn clear_deadline(&mut self) {
        self.deadline = None;
    }

    /// Currently armed deadline
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.as_ref().map(|sleep| sleep.deadline())
    }

    /// Drop the deadline and return the wrapped stream
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn poll_expired(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        if let Some(sleep) = self.deadline.as_mut() {
            if sleep.as_mut().poll(cx).is_ready() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));
            }
        }
        Ok(())
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for DeadlineStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_expired(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DeadlineStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_expired(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_expired(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
