//! Relay engine tests over in-memory pipes

use std::time::Duration;

use socks_tun::common::BufferPool;
use socks_tun::relay::{Direction, Relay, Termination};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[tokio::test]
async fn test_round_trip_both_directions() {
    let (origin, origin_peer) = duplex(64 * 1024);
    let (remote, remote_peer) = duplex(64 * 1024);
    let pool = BufferPool::new(4096);
    let relay = Relay::new(pool.clone());

    let up = payload(300 * 1024, 7);
    let down = payload(170 * 1024, 11);

    let (mut origin_rx, mut origin_tx) = tokio::io::split(origin_peer);
    let (mut remote_rx, mut remote_tx) = tokio::io::split(remote_peer);

    let up_sent = up.clone();
    let down_sent = down.clone();
    let (outcome, _, _, at_remote, at_origin) = tokio::join!(
        relay.run(origin, remote),
        async move {
            origin_tx.write_all(&up_sent).await.unwrap();
            origin_tx.shutdown().await.unwrap();
        },
        async move {
            remote_tx.write_all(&down_sent).await.unwrap();
            remote_tx.shutdown().await.unwrap();
        },
        async move {
            let mut received = Vec::new();
            remote_rx.read_to_end(&mut received).await.unwrap();
            received
        },
        async move {
            let mut received = Vec::new();
            origin_rx.read_to_end(&mut received).await.unwrap();
            received
        },
    );

    assert!(outcome.is_clean());
    assert_eq!(outcome.origin_to_remote.direction, Direction::OriginToRemote);
    assert_eq!(outcome.origin_to_remote.bytes, up.len() as u64);
    assert_eq!(outcome.remote_to_origin.bytes, down.len() as u64);
    assert_eq!(at_remote, up);
    assert_eq!(at_origin, down);

    // Both buffers went back to the pool
    assert_eq!(pool.idle(), 2);
}

#[tokio::test]
async fn test_empty_streams() {
    let (origin, mut origin_peer) = duplex(1024);
    let (remote, mut remote_peer) = duplex(1024);
    origin_peer.shutdown().await.unwrap();
    remote_peer.shutdown().await.unwrap();

    let outcome = Relay::new(BufferPool::new(1024)).run(origin, remote).await;

    assert!(outcome.is_clean());
    assert!(outcome.reports().iter().all(|report| report.bytes == 0));
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_released_after_half_close_timeout() {
    let (origin, mut origin_peer) = duplex(1024);
    let (remote, mut remote_peer) = duplex(1024);

    origin_peer.write_all(b"request").await.unwrap();
    origin_peer.shutdown().await.unwrap();

    let start = Instant::now();
    let outcome = Relay::new(BufferPool::new(1024))
        .half_close_timeout(Duration::from_secs(60))
        .run(origin, remote)
        .await;
    let elapsed = Instant::now() - start;

    assert!(matches!(outcome.origin_to_remote.termination, Termination::Eof));
    assert!(matches!(
        outcome.remote_to_origin.termination,
        Termination::DeadlineExceeded
    ));
    assert!(elapsed >= Duration::from_secs(60));
    assert!(elapsed < Duration::from_secs(61));

    let mut received = [0u8; 7];
    remote_peer.read_exact(&mut received).await.unwrap();
    assert_eq!(&received, b"request");
}

#[tokio::test(start_paused = true)]
async fn test_relay_timeout_bounds_idle_relay() {
    let (origin, _origin_peer) = duplex(1024);
    let (remote, _remote_peer) = duplex(1024);
    let pool = BufferPool::new(1024);

    let outcome = Relay::new(pool.clone())
        .relay_timeout(Some(Duration::from_secs(5)))
        .run(origin, remote)
        .await;

    assert!(!outcome.is_clean());
    for report in outcome.reports() {
        assert!(matches!(report.termination, Termination::Aborted));
    }
    assert_eq!(pool.idle(), 2);
}
