//! Live event map — Binary Entrypoint
//! Boots the ingest scheduler and the Axum read service that serves its snapshots.

use std::sync::Arc;

use live_event_map::api::{self, AppState};
use live_event_map::ingest::config::IngestConfig;
use live_event_map::metrics::Metrics;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default, JSON lines when `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("live_event_map=info,ingest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    // Shuttle may already have installed a subscriber; that one wins.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = IngestConfig::load_default()?;
    tracing::info!(
        manifest = %cfg.manifest_url,
        interval_secs = cfg.interval_secs,
        windows = cfg.window_count,
        layout = ?cfg.layout,
        "starting live event map"
    );

    let store = Arc::new(live_event_map::restore_store(&cfg));
    let scheduler = live_event_map::build_scheduler(&cfg, store.clone())?;
    let refresh = scheduler.trigger_handle();
    scheduler.spawn();

    let mut router = api::router(AppState::new(store, refresh));
    if cfg.metrics_enabled {
        match Metrics::init() {
            Ok(metrics) => router = router.merge(metrics.router()),
            Err(e) => tracing::warn!(error = ?e, "metrics disabled"),
        }
    }

    Ok(router.into())
}
