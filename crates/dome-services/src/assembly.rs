//! Frame assembly table: collects chunks per frame id, evicts frames that
//! can no longer complete, and stitches complete frames back together.
//!
//! Eviction rules, applied on every accepted chunk before it is stored:
//!   Supersede: a chunk from a newer frame drops every older pending frame.
//!   Timeout: frames whose first chunk is older than the timeout are dropped.
//!   Overflow: starting a frame while `max_pending` are open drops the oldest.
//!
//! The table is owned by a single task and mutated through `&mut self`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use dome_core::wire::{is_newer, Packet};

#[derive(Debug)]
struct FrameBuffer {
    expected: u16,
    chunks: HashMap<u16, Bytes>,
    created_at: Instant,
}

impl FrameBuffer {
    fn new(expected: u16, created_at: Instant) -> Self {
        Self {
            expected,
            chunks: HashMap::with_capacity(usize::from(expected)),
            created_at,
        }
    }

    fn is_complete(&self) -> bool {
        self.chunks.len() == usize::from(self.expected)
    }

    /// Concatenate chunks `0..expected` in index order. `None` if any index
    /// is absent.
    fn reassemble(&self) -> Option<Bytes> {
        let total: usize = self.chunks.values().map(Bytes::len).sum();
        let mut frame = BytesMut::with_capacity(total);
        for index in 0..self.expected {
            frame.extend_from_slice(self.chunks.get(&index)?);
        }
        Some(frame.freeze())
    }
}

/// Why a pending frame left the table without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    Superseded,
    Expired,
    Overflow,
}

/// A frame whose chunks all arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFrame {
    pub frame_id: u32,
    pub data: Bytes,
}

/// Everything that happened to the table while accepting one chunk.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Accepted {
    /// Frames removed before the chunk was stored, in eviction order.
    pub evicted: Vec<(u32, Eviction)>,
    /// The chunk overwrote one already buffered at the same index.
    pub duplicate: bool,
    /// The chunk's index falls outside the frame's chunk count as announced
    /// by its first chunk. Nothing was stored.
    pub rejected: bool,
    /// The count matched but an index was missing; the frame stays pending.
    pub aborted: bool,
    /// The frame this chunk completed. Already removed from the table.
    pub completed: Option<CompletedFrame>,
}

/// Per-frame-id chunk store with eviction.
#[derive(Debug)]
pub struct FrameTable {
    pending: HashMap<u32, FrameBuffer>,
    latest_frame_id: Option<u32>,
    timeout: Duration,
    max_pending: usize,
}

impl FrameTable {
    pub fn new(timeout: Duration, max_pending: usize) -> Self {
        Self {
            pending: HashMap::new(),
            latest_frame_id: None,
            timeout,
            max_pending: max_pending.max(1),
        }
    }

    /// Accept a chunk using the current time.
    pub fn accept(&mut self, packet: &Packet<'_>) -> Accepted {
        self.accept_at(packet, Instant::now())
    }

    /// Accept a chunk using an explicit clock reading.
    pub fn accept_at(&mut self, packet: &Packet<'_>, now: Instant) -> Accepted {
        let frame_id = packet.frame_id;
        let mut accepted = Accepted::default();

        if self.advance_latest(frame_id) {
            self.evict_older_than(frame_id, &mut accepted.evicted);
        }
        for id in self.purge_expired_at(now) {
            accepted.evicted.push((id, Eviction::Expired));
        }

        if !self.pending.contains_key(&frame_id) {
            if self.pending.len() >= self.max_pending {
                if let Some(id) = self.evict_oldest() {
                    accepted.evicted.push((id, Eviction::Overflow));
                }
            }
            self.pending
                .insert(frame_id, FrameBuffer::new(packet.total_chunks, now));
        }

        let Some(buffer) = self.pending.get_mut(&frame_id) else {
            return accepted;
        };

        if packet.chunk_index >= buffer.expected {
            tracing::debug!(
                frame_id,
                chunk_index = packet.chunk_index,
                expected = buffer.expected,
                "chunk index outside frame, dropping"
            );
            accepted.rejected = true;
            return accepted;
        }

        accepted.duplicate = buffer
            .chunks
            .insert(packet.chunk_index, Bytes::copy_from_slice(packet.payload))
            .is_some();

        if !buffer.is_complete() {
            return accepted;
        }

        match buffer.reassemble() {
            Some(data) => {
                self.pending.remove(&frame_id);
                accepted.completed = Some(CompletedFrame { frame_id, data });
            }
            None => {
                tracing::warn!(frame_id, "chunk missing at reassembly, keeping frame pending");
                accepted.aborted = true;
            }
        }

        accepted
    }

    /// Remove frames older than the timeout using the current time.
    pub fn purge_expired(&mut self) -> Vec<u32> {
        self.purge_expired_at(Instant::now())
    }

    /// Remove frames whose first chunk arrived more than the timeout before
    /// `now`. Returns the evicted ids.
    pub fn purge_expired_at(&mut self, now: Instant) -> Vec<u32> {
        let mut evicted = Vec::new();
        let timeout = self.timeout;

        self.pending.retain(|&frame_id, buffer| {
            let age = now.saturating_duration_since(buffer.created_at);
            let expired = age > timeout;
            if expired {
                tracing::info!(
                    frame_id,
                    age_ms = age.as_millis() as u64,
                    received = buffer.chunks.len(),
                    expected = buffer.expected,
                    "frame timed out, evicting"
                );
                evicted.push(frame_id);
            }
            !expired
        });

        evicted
    }

    pub fn contains(&self, frame_id: u32) -> bool {
        self.pending.contains_key(&frame_id)
    }

    /// Number of frames currently being assembled.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Newest frame id seen so far, by circular order.
    pub fn latest_frame_id(&self) -> Option<u32> {
        self.latest_frame_id
    }

    /// Chunks buffered for a pending frame.
    pub fn received_chunks(&self, frame_id: u32) -> Option<usize> {
        self.pending.get(&frame_id).map(|b| b.chunks.len())
    }

    /// Record `frame_id` as the latest if it is newer. The first id ever
    /// seen becomes the baseline.
    fn advance_latest(&mut self, frame_id: u32) -> bool {
        match self.latest_frame_id {
            Some(latest) if !is_newer(frame_id, latest) => false,
            _ => {
                self.latest_frame_id = Some(frame_id);
                true
            }
        }
    }

    fn evict_older_than(&mut self, latest: u32, evicted: &mut Vec<(u32, Eviction)>) {
        self.pending.retain(|&frame_id, buffer| {
            let older = is_newer(latest, frame_id);
            if older {
                tracing::info!(
                    frame_id,
                    superseded_by = latest,
                    received = buffer.chunks.len(),
                    expected = buffer.expected,
                    "frame superseded, evicting"
                );
                evicted.push((frame_id, Eviction::Superseded));
            }
            !older
        });
    }

    fn evict_oldest(&mut self) -> Option<u32> {
        let (&frame_id, _) = self
            .pending
            .iter()
            .min_by_key(|(_, buffer)| buffer.created_at)?;
        self.pending.remove(&frame_id);
        tracing::info!(frame_id, max_pending = self.max_pending, "pending limit reached, evicting");
        Some(frame_id)
    }
}
