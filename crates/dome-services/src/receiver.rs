//! Video receiver: binds the UDP socket and runs the receive loop.
//!
//! One task owns the socket, the frame table and the publisher. Each
//! iteration waits for the next datagram, a sweep tick, or shutdown;
//! nothing else suspends, so the table needs no locking.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use dome_core::config::{ConfigError, DomeConfig};
use dome_core::wire::Packet;

use crate::assembly::{Eviction, FrameTable};
use crate::publisher::FramePublisher;
use crate::stats::ReceiverStats;

/// Receive errors in a row, with no datagram in between, after which the
/// socket is considered broken.
const MAX_CONSECUTIVE_RECV_ERRORS: u32 = 64;

/// Shortest period between timeout sweeps while the socket is idle.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

// ── Settings ──────────────────────────────────────────────────────────────────

/// Validated runtime settings for one receiver.
#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    pub listen_addr: SocketAddr,
    pub frame_timeout: Duration,
    pub stream_id_filter: u8,
    pub max_pending_frames: usize,
    pub recv_buffer_bytes: usize,
    pub max_datagram_bytes: usize,
}

impl ReceiverSettings {
    pub fn from_config(config: &DomeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            listen_addr: config.listen_addr()?,
            frame_timeout: config.frame_timeout(),
            stream_id_filter: config.receiver.stream_id_filter,
            max_pending_frames: config.receiver.max_pending_frames,
            recv_buffer_bytes: config.network.recv_buffer_bytes,
            max_datagram_bytes: config.network.max_datagram_bytes,
        })
    }

    /// How often idle pending frames are checked for expiry.
    pub fn sweep_interval(&self) -> Duration {
        (self.frame_timeout / 4).max(MIN_SWEEP_INTERVAL)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("invalid receiver configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to configure socket for {addr}: {source}")]
    Socket { addr: SocketAddr, source: io::Error },

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("socket failed {count} times in a row, last error: {last}")]
    Transport { count: u32, last: io::Error },
}

// ── Receiver state ────────────────────────────────────────────────────────────

/// Everything the receive loop mutates, minus the socket.
#[derive(Debug)]
pub struct ReceiverState {
    table: FrameTable,
    publisher: FramePublisher,
    stats: ReceiverStats,
    stream_id_filter: u8,
}

impl ReceiverState {
    pub fn new(settings: &ReceiverSettings, publisher: FramePublisher, stats: ReceiverStats) -> Self {
        Self {
            table: FrameTable::new(settings.frame_timeout, settings.max_pending_frames),
            publisher,
            stats,
            stream_id_filter: settings.stream_id_filter,
        }
    }

    /// Parse one datagram and run it through the table. Returns the id of
    /// the frame it completed and published, if any.
    pub fn on_datagram(&mut self, datagram: &[u8], now: Instant) -> Option<u32> {
        self.stats.record_datagram(datagram.len());

        let packet = match Packet::parse(datagram, self.stream_id_filter) {
            Ok(p) => p,
            Err(e) if e.is_silent() => {
                tracing::trace!(error = %e, "datagram filtered");
                self.stats.record_filtered();
                return None;
            }
            Err(e) => {
                tracing::debug!(error = %e, "invalid chunk, discarding");
                self.stats.record_malformed();
                return None;
            }
        };

        let accepted = self.table.accept_at(&packet, now);

        for (_, reason) in &accepted.evicted {
            self.record_eviction(*reason);
        }
        if accepted.duplicate {
            self.stats.record_duplicate();
        }
        if accepted.rejected {
            self.stats.record_malformed();
        }
        if accepted.aborted {
            self.stats.record_aborted();
        }

        let frame = accepted.completed?;
        let bytes = frame.data.len();
        let sequence = self.publish(frame.frame_id, frame.data);
        tracing::debug!(frame_id = frame.frame_id, bytes, sequence, "frame completed");
        Some(frame.frame_id)
    }

    /// Evict frames that timed out while no chunks were arriving.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let evicted = self.table.purge_expired_at(now);
        for _ in &evicted {
            self.stats.record_expired();
        }
        evicted.len()
    }

    pub fn table(&self) -> &FrameTable {
        &self.table
    }

    fn publish(&mut self, frame_id: u32, data: Bytes) -> u64 {
        self.stats.record_completed();
        self.publisher.publish(frame_id, data)
    }

    fn record_eviction(&self, reason: Eviction) {
        match reason {
            Eviction::Superseded => self.stats.record_superseded(),
            Eviction::Expired => self.stats.record_expired(),
            Eviction::Overflow => self.stats.record_overflowed(),
        }
    }
}

// ── Receiver ──────────────────────────────────────────────────────────────────

/// A bound receiver, ready to run.
pub struct VideoReceiver {
    socket: UdpSocket,
    state: ReceiverState,
    settings: ReceiverSettings,
    shutdown: broadcast::Receiver<()>,
}

impl VideoReceiver {
    /// Validate `config` and bind the socket.
    ///
    /// On error nothing is listening and nothing is retried; the caller
    /// decides whether to stay up without a receiver.
    pub async fn start(
        config: &DomeConfig,
        publisher: FramePublisher,
        stats: ReceiverStats,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self, ReceiverError> {
        let settings = ReceiverSettings::from_config(config)?;
        Self::bind(settings, publisher, stats, shutdown).await
    }

    /// Bind using already validated settings.
    pub async fn bind(
        settings: ReceiverSettings,
        publisher: FramePublisher,
        stats: ReceiverStats,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self, ReceiverError> {
        let std_socket = make_socket(&settings)?;
        let socket = UdpSocket::from_std(std_socket).map_err(|source| ReceiverError::Socket {
            addr: settings.listen_addr,
            source,
        })?;

        let state = ReceiverState::new(&settings, publisher, stats);
        Ok(Self {
            socket,
            state,
            settings,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive until shutdown or a broken socket.
    ///
    /// Pending frames are dropped with the receiver; nothing is flushed.
    pub async fn run(self) -> Result<(), ReceiverError> {
        let Self {
            socket,
            mut state,
            settings,
            mut shutdown,
        } = self;

        let mut buf = vec![0u8; settings.max_datagram_bytes];
        let mut sweep = tokio::time::interval(settings.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_errors = 0u32;

        let local = socket.local_addr().map_err(|source| ReceiverError::Socket {
            addr: settings.listen_addr,
            source,
        })?;
        tracing::info!(
            addr = %local,
            stream_id = settings.stream_id_filter,
            timeout_ms = settings.frame_timeout.as_millis() as u64,
            "video receiver listening"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(
                        pending = state.table().pending_len(),
                        "video receiver shutting down"
                    );
                    return Ok(());
                }

                _ = sweep.tick() => {
                    state.sweep(Instant::now());
                }

                result = socket.recv_from(&mut buf) => match result {
                    Ok((len, peer)) => {
                        consecutive_errors = 0;
                        if len == 0 {
                            continue;
                        }
                        if let Some(frame_id) = state.on_datagram(&buf[..len], Instant::now()) {
                            tracing::trace!(frame_id, peer = %peer, "published frame");
                        }
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        state.stats.record_recv_error();
                        tracing::warn!(error = %e, consecutive_errors, "recv_from failed");
                        if consecutive_errors >= MAX_CONSECUTIVE_RECV_ERRORS {
                            return Err(ReceiverError::Transport {
                                count: consecutive_errors,
                                last: e,
                            });
                        }
                    }
                },
            }
        }
    }
}

/// Create the UDP socket with a large receive buffer, bound and non-blocking.
fn make_socket(settings: &ReceiverSettings) -> Result<std::net::UdpSocket, ReceiverError> {
    let addr = settings.listen_addr;
    let socket_err = |source| ReceiverError::Socket { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(socket_err)?;
    socket.set_reuse_address(true).map_err(socket_err)?;
    socket.set_nonblocking(true).map_err(socket_err)?;

    if settings.recv_buffer_bytes > 0 {
        if let Err(e) = socket.set_recv_buffer_size(settings.recv_buffer_bytes) {
            tracing::warn!(
                error = %e,
                requested = settings.recv_buffer_bytes,
                "failed to set SO_RCVBUF, using OS default"
            );
        }
    }

    socket
        .bind(&addr.into())
        .map_err(|source| ReceiverError::Bind { addr, source })?;

    Ok(socket.into())
}
