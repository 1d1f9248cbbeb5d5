//! Dome integration test harness.
//!
//! Each test binds a receiver on an ephemeral loopback port, sends real
//! UDP datagrams at it and watches what comes out of the publisher.
//!
//!   cargo test --test integration
//!
//! Tests hold their own shutdown sender; dropping it stops the receiver.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use dome_core::config::DomeConfig;
use dome_core::wire::{Packet, VIDEO_STREAM_ID};
use dome_services::{
    FramePublisher, FrameSubscriber, PublishedFrame, ReceiverError, ReceiverStats, VideoReceiver,
};

mod eviction;
mod filtering;
mod lifecycle;

// ── Harness ───────────────────────────────────────────────────────────────────

/// A receiver running in the background plus the handles a test needs.
pub struct Harness {
    pub addr: SocketAddr,
    pub frames: FrameSubscriber,
    pub stats: ReceiverStats,
    pub shutdown: broadcast::Sender<()>,
    pub task: JoinHandle<Result<(), ReceiverError>>,
    sender: UdpSocket,
}

impl Harness {
    /// Start a receiver with default settings on 127.0.0.1:0.
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| {}).await
    }

    /// Start a receiver after letting the test adjust the config.
    pub async fn start_with(tweak: impl FnOnce(&mut DomeConfig)) -> Result<Self> {
        let mut config = DomeConfig::default();
        config.network.bind_addr = "127.0.0.1".to_string();
        config.network.listen_port = 0;
        config.network.recv_buffer_bytes = 0;
        tweak(&mut config);

        let (publisher, frames) = FramePublisher::new();
        let stats = ReceiverStats::new();
        let (shutdown, shutdown_rx) = broadcast::channel(1);

        let receiver = VideoReceiver::start(&config, publisher, stats.clone(), shutdown_rx)
            .await
            .context("receiver failed to start")?;
        let addr = receiver.local_addr()?;
        let task = tokio::spawn(receiver.run());

        let sender = UdpSocket::bind("127.0.0.1:0")
            .await
            .context("failed to bind sender")?;

        Ok(Self {
            addr,
            frames,
            stats,
            shutdown,
            task,
            sender,
        })
    }

    pub async fn send(&self, datagram: &[u8]) -> Result<()> {
        self.sender
            .send_to(datagram, self.addr)
            .await
            .with_context(|| format!("failed to send to {}", self.addr))?;
        Ok(())
    }

    pub async fn send_all<D: AsRef<[u8]>>(&self, datagrams: &[D]) -> Result<()> {
        for d in datagrams {
            self.send(d.as_ref()).await?;
        }
        Ok(())
    }

    /// Wait until the receiver has pulled `n` datagrams off the socket.
    pub async fn wait_for_datagrams(&self, n: u64) -> Result<()> {
        let stats = self.stats.clone();
        wait_for_condition(Duration::from_secs(5), move || {
            let stats = stats.clone();
            async move { stats.snapshot().datagrams >= n }
        })
        .await
        .with_context(|| format!("receiver never saw {n} datagrams"))
    }

    /// Wait for the next published frame.
    pub async fn next_frame(&mut self) -> Result<PublishedFrame> {
        tokio::time::timeout(Duration::from_secs(5), self.frames.next_frame())
            .await
            .context("timed out waiting for a frame")?
            .context("publisher closed")
    }

    /// Signal shutdown and return what `run` returned.
    pub async fn stop(self) -> Result<Result<(), ReceiverError>> {
        let _ = self.shutdown.send(());
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .context("receiver did not stop")?
            .context("receiver task panicked")
    }
}

/// Encode one video chunk.
pub fn chunk(frame_id: u32, index: u16, total: u16, payload: &[u8]) -> Vec<u8> {
    chunk_on(VIDEO_STREAM_ID, frame_id, index, total, payload)
}

/// Encode one chunk on an arbitrary stream.
pub fn chunk_on(stream_id: u8, frame_id: u32, index: u16, total: u16, payload: &[u8]) -> Vec<u8> {
    Packet {
        frame_id,
        chunk_index: index,
        total_chunks: total,
        stream_id,
        payload,
    }
    .encode()
}

/// Poll `condition` every 20ms until it holds or `timeout` elapses.
pub async fn wait_for_condition<F, Fut>(timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
