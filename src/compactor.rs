use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact the journal once `threshold` records were appended since the
/// last compaction. Returns whether it ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appended = engine.wal_appends_since_compact().await;
    if appended < threshold {
        return Ok(false);
    }
    engine.compact_wal().await?;
    info!("compacted journal after {appended} appends");
    Ok(true)
}

/// Background task: periodic journal compaction and cleanup of
/// notification channels nobody listens to any more.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&engine, threshold).await {
            warn!("compaction failed: {e}");
        }
        let pruned = engine.notify.prune_idle();
        if pruned > 0 {
            debug!("dropped {pruned} idle notification channels");
        }
    }
}
