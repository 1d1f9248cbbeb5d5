//! Snapshot sink: mirrors the latest completed frame to a file.
//!
//! Stands in for the rendering side. It only ever sees the newest frame;
//! frames published while a write is in flight are skipped.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use dome_services::{FrameSubscriber, PublishedFrame};

/// Run the sink as a daemon task. A failing sink is logged and then waits
/// for shutdown; it never takes the receiver down with it.
pub async fn run_sink(
    frames: FrameSubscriber,
    path: PathBuf,
    mut shutdown: broadcast::Receiver<()>,
) {
    if let Err(e) = snapshot_loop(frames, &path, &mut shutdown).await {
        tracing::error!(
            error = %e,
            path = %path.display(),
            "snapshot sink failed, frames are no longer persisted"
        );
        let _ = shutdown.recv().await;
    }
}

/// Write each newly published frame to `path` until shutdown or until the
/// publisher goes away.
pub async fn snapshot_loop(
    mut frames: FrameSubscriber,
    path: &Path,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    tracing::info!(path = %path.display(), "snapshot sink started");

    let mut last_sequence = 0u64;
    loop {
        let frame = tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            next = frames.next_frame() => match next {
                Ok(frame) => frame,
                Err(_) => {
                    tracing::info!("frame publisher closed, stopping snapshot sink");
                    return Ok(());
                }
            },
        };

        let skipped = frame.sequence.saturating_sub(last_sequence + 1);
        last_sequence = frame.sequence;

        if let Err(e) = write_snapshot(path, &frame).await {
            tracing::warn!(error = %e, frame_id = frame.frame_id, "failed to write snapshot");
            continue;
        }
        tracing::trace!(frame_id = frame.frame_id, skipped, "snapshot written");
    }
}

/// Atomic write: tmp file → rename, so readers never see a torn frame.
pub async fn write_snapshot(path: &Path, frame: &PublishedFrame) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, &frame.data)
        .await
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path).await.with_context(|| {
        format!(
            "failed to rename {} to {}",
            tmp_path.display(),
            path.display()
        )
    })?;
    Ok(())
}
