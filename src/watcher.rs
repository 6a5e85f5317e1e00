use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::file_source::JsonSnapshotSource;

/// Background task that polls the snapshot file and notifies subscribers of changes.
pub async fn run_snapshot_watcher(source: Arc<JsonSnapshotSource>, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(path = %source.path().display(), every_ms = every.as_millis() as u64, "snapshot watcher started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        match source.poll_changes().await {
            Ok(true) => info!("availability snapshot changed"),
            Ok(false) => {}
            // The file may be mid-write; the next tick reads it again.
            Err(e) => warn!("snapshot poll failed: {e}"),
        }
    }
    debug!("snapshot watcher stopped");
}
