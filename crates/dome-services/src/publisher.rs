//! Frame publisher: hands completed frames to the rendering side.
//!
//! A single-slot `watch` channel: every publish replaces the previous frame,
//! the producer never waits, and a slow consumer sees only the newest frame
//! when it next looks.

use bytes::Bytes;
use tokio::sync::watch;

/// A completed frame as seen by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFrame {
    /// Wire id of the frame.
    pub frame_id: u32,
    /// Completion counter, starting at 1. Increases by one per publish, so
    /// consumers can tell how many frames they skipped.
    pub sequence: u64,
    /// Reassembled frame bytes, typically a JPEG image.
    pub data: Bytes,
}

/// Producer half. Owned by the receive loop.
#[derive(Debug)]
pub struct FramePublisher {
    tx: watch::Sender<Option<PublishedFrame>>,
    sequence: u64,
}

/// Consumer half. Cheap to clone; each clone tracks its own "seen" state.
#[derive(Debug, Clone)]
pub struct FrameSubscriber {
    rx: watch::Receiver<Option<PublishedFrame>>,
}

/// The publisher is gone and no further frames will arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame publisher closed")]
pub struct PublisherClosed;

impl FramePublisher {
    pub fn new() -> (Self, FrameSubscriber) {
        let (tx, rx) = watch::channel(None);
        (Self { tx, sequence: 0 }, FrameSubscriber { rx })
    }

    /// Replace the published frame. Never blocks, and succeeds even when
    /// nobody is subscribed.
    pub fn publish(&mut self, frame_id: u32, data: Bytes) -> u64 {
        self.sequence += 1;
        let sequence = self.sequence;
        self.tx.send_replace(Some(PublishedFrame {
            frame_id,
            sequence,
            data,
        }));
        sequence
    }

    pub fn subscribe(&self) -> FrameSubscriber {
        FrameSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    /// Frames published so far.
    pub fn published(&self) -> u64 {
        self.sequence
    }
}

impl FrameSubscriber {
    /// The most recently completed frame, if any.
    pub fn latest(&self) -> Option<PublishedFrame> {
        self.rx.borrow().clone()
    }

    /// Wait until a frame newer than the last one this handle observed is
    /// published, and return it.
    pub async fn next_frame(&mut self) -> Result<PublishedFrame, PublisherClosed> {
        loop {
            self.rx.changed().await.map_err(|_| PublisherClosed)?;
            if let Some(frame) = self.rx.borrow_and_update().clone() {
                return Ok(frame);
            }
        }
    }
}
