//! Data forwarding module
//!
//! Copies bytes in both directions between the interface stream (origin) and
//! the proxy circuit (remote). Each direction runs in its own task with its
//! own pooled buffer; the relay returns once both have finished.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::common::BufferPool;
use super::stream::{split, DuplexStream, ReadEnd, WriteEnd};

/// How long a stream stays readable after the opposite direction finished
pub const HALF_CLOSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Relay direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Interface to proxy
    OriginToRemote,
    /// Proxy to interface
    RemoteToOrigin,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OriginToRemote => "origin->remote",
            Self::RemoteToOrigin => "remote->origin",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a direction stopped copying
#[derive(Debug)]
pub enum Termination {
    /// The source signalled end-of-stream
    Eof,
    /// Reading from the source failed
    ReadFailed(io::Error),
    /// Writing to the destination failed
    WriteFailed(io::Error),
    /// The source's read deadline passed
    DeadlineExceeded,
    /// The task was cancelled by the relay timeout, or panicked
    Aborted,
}

impl Termination {
    /// True when the direction ended by end-of-stream
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => write!(f, "end of stream"),
            Self::ReadFailed(e) => write!(f, "read failed: {}", e),
            Self::WriteFailed(e) => write!(f, "write failed: {}", e),
            Self::DeadlineExceeded => write!(f, "read deadline exceeded"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Result of one relay direction
#[derive(Debug)]
pub struct DirectionReport {
    pub direction: Direction,
    /// Bytes written to the destination
    pub bytes: u64,
    pub termination: Termination,
}

/// Combined result of both relay directions
#[derive(Debug)]
pub struct RelayOutcome {
    pub origin_to_remote: DirectionReport,
    pub remote_to_origin: DirectionReport,
}

impl RelayOutcome {
    /// True when both directions ended by end-of-stream
    pub fn is_clean(&self) -> bool {
        self.origin_to_remote.termination.is_clean() && self.remote_to_origin.termination.is_clean()
    }

    pub fn reports(&self) -> [&DirectionReport; 2] {
        [&self.origin_to_remote, &self.remote_to_origin]
    }
}

/// Bidirectional relay
///
/// # Example
///
/// ```no_run
/// # use socks_tun::relay::Relay;
/// # use socks_tun::common::BufferPool;
/// # async fn example(origin: tokio::net::TcpStream, remote: tokio::net::TcpStream) {
/// let outcome = Relay::new(BufferPool::shared().clone())
///     .run(origin, remote)
///     .await;
/// for report in outcome.reports() {
///     println!("{}: {} bytes, {}", report.direction, report.bytes, report.termination);
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Relay {
    pool: BufferPool,
    half_close_timeout: Duration,
    relay_timeout: Option<Duration>,
}

impl Relay {
    /// Create a relay drawing its buffers from `pool`
    pub fn new(pool: BufferPool) -> Self {
        Self {
            pool,
            half_close_timeout: HALF_CLOSE_TIMEOUT,
            relay_timeout: None,
        }
    }

    /// Read deadline applied to a destination once its direction finished
    pub fn half_close_timeout(mut self, timeout: Duration) -> Self {
        self.half_close_timeout = timeout;
        self
    }

    /// Upper bound on the whole relay; `None` waits for both directions
    pub fn relay_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.relay_timeout = timeout;
        self
    }

    /// Relay between `origin` and `remote` until both directions end
    pub async fn run<A, B>(&self, origin: A, remote: B) -> RelayOutcome
    where
        A: DuplexStream,
        B: DuplexStream,
    {
        self.run_split(split(origin), split(remote)).await
    }

    /// Same as [`Relay::run`] for streams that were already split
    ///
    /// Useful when the caller wants to keep a deadline watch on an end.
    pub async fn run_split<A, B>(
        &self,
        origin: (ReadEnd<A>, WriteEnd<A>),
        remote: (ReadEnd<B>, WriteEnd<B>),
    ) -> RelayOutcome
    where
        A: DuplexStream,
        B: DuplexStream,
    {
        let (origin_read, origin_write) = origin;
        let (remote_read, remote_write) = remote;
        let deadline = self.relay_timeout.map(|limit| Instant::now() + limit);

        let up_bytes = Arc::new(AtomicU64::new(0));
        let down_bytes = Arc::new(AtomicU64::new(0));

        let upstream = tokio::spawn(forward(
            Direction::OriginToRemote,
            origin_read,
            remote_write,
            self.pool.clone(),
            self.half_close_timeout,
            Arc::clone(&up_bytes),
        ));
        let downstream = tokio::spawn(forward(
            Direction::RemoteToOrigin,
            remote_read,
            origin_write,
            self.pool.clone(),
            self.half_close_timeout,
            Arc::clone(&down_bytes),
        ));

        let (origin_to_remote, remote_to_origin) = tokio::join!(
            join_direction(Direction::OriginToRemote, upstream, deadline, up_bytes),
            join_direction(Direction::RemoteToOrigin, downstream, deadline, down_bytes),
        );

        RelayOutcome {
            origin_to_remote,
            remote_to_origin,
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(BufferPool::shared().clone())
    }
}

async fn join_direction(
    direction: Direction,
    mut handle: JoinHandle<DirectionReport>,
    deadline: Option<Instant>,
    bytes: Arc<AtomicU64>,
) -> DirectionReport {
    let joined = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("[relay] {} still running at the relay timeout, aborting", direction);
                handle.abort();
                handle.await
            }
        },
        None => handle.await,
    };

    joined.unwrap_or_else(|e| {
        if e.is_panic() {
            warn!("[relay] {} task panicked", direction);
        }
        DirectionReport {
            direction,
            bytes: bytes.load(Ordering::Relaxed),
            termination: Termination::Aborted,
        }
    })
}

async fn forward<R, W>(
    direction: Direction,
    mut source: ReadEnd<R>,
    mut destination: WriteEnd<W>,
    pool: BufferPool,
    half_close_timeout: Duration,
    bytes: Arc<AtomicU64>,
) -> DirectionReport
where
    R: DuplexStream,
    W: DuplexStream,
{
    let mut buffer = pool.acquire();
    let termination = copy(&mut source, &mut destination, &mut buffer, &bytes).await;
    drop(buffer);

    if let Some(Err(e)) = source.close_read() {
        debug!("[relay] {}: close read side: {}", direction, e);
    }
    if let Some(Err(e)) = destination.close_write() {
        debug!("[relay] {}: close write side: {}", direction, e);
    }
    destination.set_read_deadline(Some(Instant::now() + half_close_timeout));

    let bytes = bytes.load(Ordering::Relaxed);
    metrics::counter!("socks_tun_relay_bytes_total", "direction" => direction.as_str()).increment(bytes);

    match &termination {
        Termination::Eof => debug!("[relay] {} finished after {} bytes", direction, bytes),
        Termination::DeadlineExceeded => {
            info!("[relay] {} closed by half-close timeout after {} bytes", direction, bytes)
        }
        other => warn!("[relay] copy data for {}: {}", direction, other),
    }

    DirectionReport {
        direction,
        bytes,
        termination,
    }
}

async fn copy<R, W>(
    source: &mut ReadEnd<R>,
    destination: &mut WriteEnd<W>,
    buffer: &mut [u8],
    bytes: &AtomicU64,
) -> Termination
where
    R: DuplexStream,
    W: DuplexStream,
{
    loop {
        let n = match source.read_with_deadline(buffer).await {
            Ok(0) => return Termination::Eof,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Termination::DeadlineExceeded,
            Err(e) => return Termination::ReadFailed(e),
        };

        if let Err(e) = destination.write_all(&buffer[..n]).await {
            return Termination::WriteFailed(e);
        }
        if let Err(e) = destination.flush().await {
            return Termination::WriteFailed(e);
        }
        bytes.fetch_add(n as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::stream::HalfClose;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, DuplexStream as Pipe, ReadBuf};

    /// In-memory stream that records half-close calls
    struct RecordingStream {
        inner: Pipe,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl RecordingStream {
        fn new(inner: Pipe) -> (Self, Arc<Mutex<Vec<&'static str>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (Self { inner, calls: Arc::clone(&calls) }, calls)
        }
    }

    impl AsyncRead for RecordingStream {
        fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for RecordingStream {
        fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    impl HalfClose for RecordingStream {
        fn close_read(&mut self) -> io::Result<()> {
            self.calls.lock().unwrap().push("close_read");
            Ok(())
        }

        fn close_write(&mut self) -> io::Result<()> {
            self.calls.lock().unwrap().push("close_write");
            Ok(())
        }
    }

    impl DuplexStream for RecordingStream {
        fn half_close(&mut self) -> Option<&mut dyn HalfClose> {
            Some(self)
        }
    }

    #[tokio::test]
    async fn test_half_close_propagation() {
        let (origin_local, mut origin_peer) = tokio::io::duplex(1024);
        let (remote_local, mut remote_peer) = tokio::io::duplex(1024);
        let (origin, origin_calls) = RecordingStream::new(origin_local);
        let (remote, remote_calls) = RecordingStream::new(remote_local);

        origin_peer.write_all(b"request").await.unwrap();
        origin_peer.shutdown().await.unwrap();
        remote_peer.write_all(b"response").await.unwrap();
        remote_peer.shutdown().await.unwrap();

        let outcome = Relay::new(BufferPool::new(16)).run(origin, remote).await;
        assert!(outcome.is_clean());

        // origin->remote closes origin's read side and remote's write side,
        // remote->origin does the opposite.
        let mut origin_calls = origin_calls.lock().unwrap().clone();
        let mut remote_calls = remote_calls.lock().unwrap().clone();
        origin_calls.sort();
        remote_calls.sort();
        assert_eq!(origin_calls, vec!["close_read", "close_write"]);
        assert_eq!(remote_calls, vec!["close_read", "close_write"]);

        let mut received = Vec::new();
        remote_peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"request");
        received.clear();
        origin_peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"response");
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_close_deadline_on_active_direction() {
        let (origin_local, mut origin_peer) = tokio::io::duplex(1024);
        let (remote_local, _remote_peer) = tokio::io::duplex(1024);

        // origin->remote ends immediately, remote->origin never sees data
        origin_peer.shutdown().await.unwrap();

        let origin = split(origin_local);
        let remote = split(remote_local);
        let remote_deadline = remote.0.deadline_watch();
        let start = Instant::now();

        let outcome = Relay::new(BufferPool::new(16)).run_split(origin, remote).await;

        assert!(outcome.origin_to_remote.termination.is_clean());
        assert!(matches!(
            outcome.remote_to_origin.termination,
            Termination::DeadlineExceeded
        ));
        assert_eq!(*remote_deadline.borrow(), Some(start + HALF_CLOSE_TIMEOUT));
        let elapsed = Instant::now() - start;
        assert!(elapsed >= HALF_CLOSE_TIMEOUT && elapsed < HALF_CLOSE_TIMEOUT + Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_timeout_aborts_both_directions() {
        let (origin_local, _origin_peer) = tokio::io::duplex(1024);
        let (remote_local, _remote_peer) = tokio::io::duplex(1024);
        let pool = BufferPool::new(16);

        let outcome = Relay::new(pool.clone())
            .relay_timeout(Some(Duration::from_secs(5)))
            .run(origin_local, remote_local)
            .await;

        for report in outcome.reports() {
            assert!(matches!(report.termination, Termination::Aborted));
        }
        // Aborted directions still hand their buffers back
        assert_eq!(pool.idle(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_does_not_stop_other_direction() {
        let (origin_local, mut origin_peer) = tokio::io::duplex(1024);
        let (remote_local, remote_peer) = tokio::io::duplex(1024);

        origin_peer.write_all(b"lost").await.unwrap();
        // Remote peer is gone: writes towards it fail, reads from it hit EOF.
        drop(remote_peer);

        let relay = tokio::spawn(async move {
            Relay::new(BufferPool::new(16)).run(origin_local, remote_local).await
        });

        // remote->origin reaches EOF; origin->remote must still be driven to
        // completion by the origin side closing.
        origin_peer.shutdown().await.unwrap();
        let outcome = relay.await.unwrap();

        match &outcome.origin_to_remote.termination {
            Termination::WriteFailed(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected a write failure, got {}", other),
        }
        assert_eq!(outcome.origin_to_remote.bytes, 0);
        assert!(outcome.remote_to_origin.termination.is_clean());
        assert_eq!(outcome.remote_to_origin.bytes, 0);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(Direction::OriginToRemote.to_string(), "origin->remote");
        assert_eq!(Direction::RemoteToOrigin.to_string(), "remote->origin");
        assert!(Termination::Eof.is_clean());
        assert!(!Termination::DeadlineExceeded.is_clean());
    }
}
