//! Datagrams the receiver must ignore without disturbing assembly.

use bytes::Bytes;

use crate::{chunk, chunk_on, Harness};

#[tokio::test]
async fn other_streams_are_ignored() {
    let mut h = Harness::start().await.unwrap();

    h.send(&chunk_on(1, 9, 0, 1, b"audio")).await.unwrap();
    h.send(&chunk_on(3, 9, 0, 1, b"telemetry")).await.unwrap();
    h.send(&chunk(2, 0, 1, b"video")).await.unwrap();

    let frame = h.next_frame().await.unwrap();
    assert_eq!(frame.frame_id, 2);
    assert_eq!(frame.sequence, 1);

    let s = h.stats.snapshot();
    assert_eq!(s.datagrams, 3);
    assert_eq!(s.filtered, 2);

    h.stop().await.unwrap().unwrap();
}

#[tokio::test]
async fn header_only_and_short_datagrams_are_dropped() {
    let mut h = Harness::start().await.unwrap();

    // Exactly a header, no payload.
    h.send(&[0, 0, 0, 1, 0, 0, 0, 1, 2]).await.unwrap();
    h.send(&[0xde, 0xad]).await.unwrap();
    h.wait_for_datagrams(2).await.unwrap();
    assert!(h.frames.latest().is_none());

    // Ten bytes is the smallest chunk that counts.
    h.send(&chunk(1, 0, 1, b"z")).await.unwrap();
    let frame = h.next_frame().await.unwrap();
    assert_eq!(frame.data, Bytes::from_static(b"z"));
    assert_eq!(h.stats.snapshot().filtered, 2);

    h.stop().await.unwrap().unwrap();
}

#[tokio::test]
async fn garbage_between_chunks_does_not_break_a_frame() {
    let mut h = Harness::start().await.unwrap();

    h.send(&chunk(11, 0, 2, b"he")).await.unwrap();
    h.send(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
    h.send(&chunk(11, 5, 2, b"??")).await.unwrap();
    h.send(&chunk(11, 0, 0, b"??")).await.unwrap();
    h.send(&chunk(11, 1, 2, b"llo")).await.unwrap();

    let frame = h.next_frame().await.unwrap();
    assert_eq!(frame.frame_id, 11);
    assert_eq!(frame.data, Bytes::from_static(b"hello"));

    let s = h.stats.snapshot();
    assert_eq!(s.datagrams, 5);
    assert_eq!(s.malformed, 2);

    h.stop().await.unwrap().unwrap();
}
