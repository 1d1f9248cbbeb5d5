//! Timeout, supersede and overflow eviction as seen from outside.

use std::time::Duration;

use bytes::Bytes;

use crate::{chunk, wait_for_condition, Harness};

#[tokio::test]
async fn idle_partial_frame_times_out() {
    let h = Harness::start_with(|c| c.receiver.frame_timeout_ms = 100)
        .await
        .unwrap();

    h.send(&chunk(1, 0, 3, b"A")).await.unwrap();
    h.wait_for_datagrams(1).await.unwrap();

    // No further traffic: only the periodic sweep can evict it.
    let stats = h.stats.clone();
    wait_for_condition(Duration::from_secs(3), move || {
        let stats = stats.clone();
        async move { stats.snapshot().frames_expired == 1 }
    })
    .await
    .unwrap();

    // The rest of the frame arrives too late and starts a fresh buffer.
    h.send(&chunk(1, 1, 3, b"B")).await.unwrap();
    h.send(&chunk(1, 2, 3, b"C")).await.unwrap();
    h.wait_for_datagrams(3).await.unwrap();

    assert!(h.frames.latest().is_none());
    assert_eq!(h.stats.snapshot().frames_completed, 0);

    h.stop().await.unwrap().unwrap();
}

#[tokio::test]
async fn newer_frame_supersedes_incomplete_one() {
    let mut h = Harness::start().await.unwrap();

    h.send(&chunk(5, 0, 2, b"five-")).await.unwrap();
    h.send(&chunk(6, 0, 1, b"six")).await.unwrap();

    let frame = h.next_frame().await.unwrap();
    assert_eq!(frame.frame_id, 6);
    assert_eq!(h.stats.snapshot().frames_superseded, 1);

    // The second half of frame 5 cannot complete it any more.
    h.send(&chunk(5, 1, 2, b"tail")).await.unwrap();
    h.wait_for_datagrams(3).await.unwrap();

    let latest = h.frames.latest().unwrap();
    assert_eq!(latest.frame_id, 6);
    assert_eq!(latest.data, Bytes::from_static(b"six"));
    assert_eq!(h.stats.snapshot().frames_completed, 1);

    h.stop().await.unwrap().unwrap();
}

#[tokio::test]
async fn pending_cap_drops_oldest_frame() {
    let mut h = Harness::start_with(|c| c.receiver.max_pending_frames = 2)
        .await
        .unwrap();

    // Descending ids never supersede each other, so only the cap applies.
    h.send(&chunk(30, 0, 2, b"x")).await.unwrap();
    h.send(&chunk(20, 0, 2, b"y")).await.unwrap();
    h.send(&chunk(10, 0, 2, b"z")).await.unwrap();
    h.wait_for_datagrams(3).await.unwrap();
    assert_eq!(h.stats.snapshot().frames_overflowed, 1);

    // Frame 30 was evicted; completing 20 still works.
    h.send(&chunk(20, 1, 2, b"!")).await.unwrap();
    let frame = h.next_frame().await.unwrap();
    assert_eq!(frame.frame_id, 20);
    assert_eq!(frame.data, Bytes::from_static(b"y!"));

    h.send(&chunk(30, 1, 2, b"?")).await.unwrap();
    h.wait_for_datagrams(5).await.unwrap();
    assert_eq!(h.frames.latest().unwrap().frame_id, 20);

    h.stop().await.unwrap().unwrap();
}
