// src/ingest/mod.rs
pub mod aggregate;
pub mod codec;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod parser;
pub mod resolver;
pub mod scheduler;
pub mod transport;
pub mod types;

use std::sync::Arc;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;

use crate::ingest::aggregate::{aggregate, WindowEvents};
use crate::ingest::config::IngestConfig;
use crate::ingest::error::CycleError;
use crate::ingest::fetcher::RecordFetcher;
use crate::ingest::parser::{parse_window, ColumnLayout};
use crate::ingest::resolver::WindowResolver;
use crate::ingest::transport::Transport;
use crate::snapshot::{Publisher, SnapshotMirror, SnapshotStore};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_cycles_total", "Ingest cycles by outcome.");
        describe_counter!(
            "ingest_windows_failed_total",
            "Windows dropped from a cycle (fetch or container failure)."
        );
        describe_counter!(
            "ingest_rows_dropped_total",
            "Rows rejected by validation, by reason."
        );
        describe_counter!(
            "ingest_events_kept_total",
            "Validated events across all fetched windows."
        );
        describe_counter!(
            "ingest_dedup_collapsed_total",
            "Observations folded into an existing dedup key."
        );
        describe_counter!(
            "ingest_publish_suppressed_total",
            "Publishes refused because the event set was empty."
        );
        describe_histogram!("ingest_fetch_ms", "Per-attempt window fetch time in milliseconds.");
        describe_gauge!("snapshot_generation", "Generation of the current snapshot.");
        describe_gauge!("snapshot_features", "Feature count of the current snapshot.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest pipeline last ran."
        );
    });
}

/// What one successful cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub generation: u64,
    pub windows_fetched: Vec<String>,
    pub windows_failed: Vec<String>,
    pub rows_seen: usize,
    pub rows_dropped: usize,
    pub events: usize,
    pub duplicates_collapsed: usize,
}

/// Resolver → Fetcher → Parser/Validator → Aggregator → Publisher.
pub struct Pipeline {
    resolver: WindowResolver,
    fetcher: RecordFetcher,
    layout: ColumnLayout,
    publisher: Publisher,
}

impl Pipeline {
    pub fn new(
        resolver: WindowResolver,
        fetcher: RecordFetcher,
        layout: ColumnLayout,
        publisher: Publisher,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            layout,
            publisher,
        }
    }

    pub fn from_config(
        cfg: &IngestConfig,
        transport: Arc<dyn Transport>,
        store: Arc<SnapshotStore>,
    ) -> Self {
        let resolver = WindowResolver::new(
            transport.clone(),
            cfg.manifest_url.clone(),
            cfg.export_marker.clone(),
            cfg.window_count,
        );
        let fetcher = RecordFetcher::new(transport, cfg.http_timeout(), cfg.backoff());
        let mut publisher = Publisher::new(store, cfg.publish_mode());
        if let Some(path) = &cfg.mirror_path {
            publisher = publisher.with_mirror(SnapshotMirror::new(path));
        }
        Self::new(resolver, fetcher, cfg.layout.columns(), publisher)
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        self.publisher.store()
    }

    /// Run one full cycle. Window-level failures are absorbed here; only a failed
    /// resolution or a refused/failed publish comes back as an error.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        ensure_metrics_described();
        gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

        let windows = self.resolver.resolve().await?;

        let mut fetched = Vec::with_capacity(windows.len());
        let mut failed = Vec::new();
        let mut rows_seen = 0usize;
        let mut rows_dropped = 0usize;

        for window in windows {
            let payload = match self.fetcher.fetch(&window).await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(target: "ingest", error = %e, "window dropped from cycle");
                    counter!("ingest_windows_failed_total").increment(1);
                    failed.push(window.label());
                    continue;
                }
            };

            let parsed = match parse_window(&payload, self.layout) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(
                        target: "ingest",
                        window = %window.label(),
                        error = %e,
                        "unreadable payload, window dropped"
                    );
                    counter!("ingest_windows_failed_total").increment(1);
                    failed.push(window.label());
                    continue;
                }
            };

            for (reason, n) in &parsed.stats.dropped {
                counter!("ingest_rows_dropped_total", "reason" => *reason).increment(*n as u64);
            }
            counter!("ingest_events_kept_total").increment(parsed.stats.kept as u64);
            tracing::info!(
                target: "ingest",
                window = %window.label(),
                rows = parsed.stats.rows,
                kept = parsed.stats.kept,
                dropped = parsed.stats.dropped_total(),
                "window parsed"
            );

            rows_seen += parsed.stats.rows;
            rows_dropped += parsed.stats.dropped_total();
            fetched.push(WindowEvents {
                window,
                events: parsed.events,
            });
        }

        let windows_used: Vec<_> = fetched.iter().map(|w| w.window.clone()).collect();
        let set = aggregate(fetched);
        counter!("ingest_dedup_collapsed_total").increment(set.duplicates_collapsed() as u64);

        let snap = self.publisher.publish(&set, &windows_used)?;

        Ok(CycleReport {
            generation: snap.generation(),
            windows_fetched: windows_used.iter().map(|w| w.label()).collect(),
            windows_failed: failed,
            rows_seen,
            rows_dropped,
            events: set.len(),
            duplicates_collapsed: set.duplicates_collapsed(),
        })
    }
}
