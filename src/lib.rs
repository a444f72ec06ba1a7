// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod geojson;
pub mod ingest;
pub mod metrics;
pub mod snapshot;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::ingest::scheduler::CycleScheduler;
pub use crate::ingest::Pipeline;
pub use crate::snapshot::{Snapshot, SnapshotStore};

use std::sync::Arc;

use anyhow::Context;
use ::metrics::gauge;

use crate::ingest::config::IngestConfig;
use crate::ingest::transport::HttpTransport;
use crate::snapshot::SnapshotMirror;

/// Build the snapshot store, recovering the last mirrored document when configured.
/// A broken mirror is logged and ignored; the service then starts from generation 0.
pub fn restore_store(cfg: &IngestConfig) -> SnapshotStore {
    let Some(path) = &cfg.mirror_path else {
        return SnapshotStore::default();
    };
    match SnapshotMirror::new(path).load() {
        Ok(Some(snap)) => {
            tracing::info!(
                generation = snap.generation(),
                features = snap.feature_count(),
                path = %path.display(),
                "restored snapshot from mirror"
            );
            gauge!("snapshot_generation").set(snap.generation() as f64);
            gauge!("snapshot_features").set(snap.feature_count() as f64);
            SnapshotStore::new(snap)
        }
        Ok(None) => SnapshotStore::default(),
        Err(e) => {
            tracing::warn!(error = ?e, "ignoring unreadable snapshot mirror");
            SnapshotStore::default()
        }
    }
}

/// Wire the HTTP transport, pipeline and scheduler for a production run.
pub fn build_scheduler(
    cfg: &IngestConfig,
    store: Arc<SnapshotStore>,
) -> anyhow::Result<Arc<CycleScheduler>> {
    let transport = HttpTransport::new(cfg.http_timeout(), &cfg.user_agent)
        .context("creating upstream transport")?;
    let pipeline = Pipeline::from_config(cfg, Arc::new(transport), store);
    Ok(Arc::new(CycleScheduler::new(
        Arc::new(pipeline),
        cfg.interval(),
    )))
}
