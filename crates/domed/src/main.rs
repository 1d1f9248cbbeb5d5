//! domed: Dome video receiver daemon.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;

use dome_core::config::DomeConfig;
use dome_services::{FramePublisher, ReceiverStats, VideoReceiver};

mod snapshot;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // Load config
    if let Err(e) = DomeConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = match DomeConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config, receiver not started");
            return idle_until_shutdown(shutdown_rx).await;
        }
    };
    tracing::info!(path = %DomeConfig::file_path().display(), "domed starting");

    // ── Receiver ─────────────────────────────────────────────────────────────
    let (publisher, frames) = FramePublisher::new();
    let stats = ReceiverStats::new();

    let receiver = match VideoReceiver::start(
        &config,
        publisher,
        stats.clone(),
        shutdown_tx.subscribe(),
    )
    .await
    {
        Ok(receiver) => receiver,
        Err(e) => {
            tracing::error!(error = %e, "video receiver not started");
            return idle_until_shutdown(shutdown_rx).await;
        }
    };

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let receiver_task = {
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = receiver.run().await {
                tracing::error!(error = %e, "video receiver failed, no longer receiving");
                let _ = shutdown.recv().await;
            }
        })
    };

    // Not an exit condition: a failed sink leaves the receiver running.
    match config.output.snapshot_path.clone() {
        Some(path) => {
            tokio::spawn(snapshot::run_sink(frames, path, shutdown_tx.subscribe()));
        }
        None => tracing::info!("no snapshot_path configured, frames are not persisted"),
    }

    let stats_printer = {
        let stats = stats.clone();
        let period = config.output.stats_interval_secs;
        tokio::spawn(async move {
            if period == 0 {
                return std::future::pending::<()>().await;
            }
            let mut interval = tokio::time::interval(Duration::from_secs(period));
            loop {
                interval.tick().await;
                stats.print_stats();
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = receiver_task       => tracing::error!("receiver task exited: {:?}", r),
        r = stats_printer       => tracing::error!("stats printer exited: {:?}", r),
    }

    stats.print_stats();
    Ok(())
}

/// Keep the process up with no receiver until asked to stop.
async fn idle_until_shutdown(mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let _ = shutdown.recv().await;
    tracing::info!("shutting down");
    Ok(())
}
