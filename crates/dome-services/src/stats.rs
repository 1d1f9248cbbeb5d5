//! Receive statistics: lock-free counters shared between the receive loop
//! and whoever reports on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    datagrams: AtomicU64,
    bytes: AtomicU64,
    filtered: AtomicU64,
    malformed: AtomicU64,
    duplicate_chunks: AtomicU64,
    frames_completed: AtomicU64,
    frames_expired: AtomicU64,
    frames_superseded: AtomicU64,
    frames_overflowed: AtomicU64,
    reconstructions_aborted: AtomicU64,
    recv_errors: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub datagrams: u64,
    pub bytes: u64,
    pub filtered: u64,
    pub malformed: u64,
    pub duplicate_chunks: u64,
    pub frames_completed: u64,
    pub frames_expired: u64,
    pub frames_superseded: u64,
    pub frames_overflowed: u64,
    pub reconstructions_aborted: u64,
    pub recv_errors: u64,
}

/// Cloneable handle to one receiver's counters.
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    inner: Arc<Counters>,
}

macro_rules! counter {
    ($name:ident, $field:ident) => {
        pub fn $name(&self) {
            self.inner.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one datagram pulled off the socket.
    pub fn record_datagram(&self, len: usize) {
        self.inner.datagrams.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    counter!(record_filtered, filtered);
    counter!(record_malformed, malformed);
    counter!(record_duplicate, duplicate_chunks);
    counter!(record_completed, frames_completed);
    counter!(record_expired, frames_expired);
    counter!(record_superseded, frames_superseded);
    counter!(record_overflowed, frames_overflowed);
    counter!(record_aborted, reconstructions_aborted);
    counter!(record_recv_error, recv_errors);

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.inner;
        StatsSnapshot {
            datagrams: c.datagrams.load(Ordering::Relaxed),
            bytes: c.bytes.load(Ordering::Relaxed),
            filtered: c.filtered.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
            duplicate_chunks: c.duplicate_chunks.load(Ordering::Relaxed),
            frames_completed: c.frames_completed.load(Ordering::Relaxed),
            frames_expired: c.frames_expired.load(Ordering::Relaxed),
            frames_superseded: c.frames_superseded.load(Ordering::Relaxed),
            frames_overflowed: c.frames_overflowed.load(Ordering::Relaxed),
            reconstructions_aborted: c.reconstructions_aborted.load(Ordering::Relaxed),
            recv_errors: c.recv_errors.load(Ordering::Relaxed),
        }
    }

    /// Log the counters. Quiet until the first datagram arrives.
    pub fn print_stats(&self) {
        let s = self.snapshot();
        if s.datagrams == 0 {
            return;
        }
        tracing::info!(
            datagrams = s.datagrams,
            bytes = s.bytes,
            filtered = s.filtered,
            malformed = s.malformed,
            duplicate_chunks = s.duplicate_chunks,
            frames_completed = s.frames_completed,
            frames_expired = s.frames_expired,
            frames_superseded = s.frames_superseded,
            frames_overflowed = s.frames_overflowed,
            reconstructions_aborted = s.reconstructions_aborted,
            recv_errors = s.recv_errors,
            "receiver stats"
        );
    }
}
