// tests/metrics.rs
// Installs the global recorder, so this file keeps to a single test.
mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use common::*;
use live_event_map::metrics::Metrics;
use live_event_map::{CycleScheduler, SnapshotStore};
use tower::ServiceExt;

#[tokio::test]
async fn metrics_endpoint_contains_ingest_series() {
    let metrics = Metrics::init().expect("install recorder");

    let store = Arc::new(SnapshotStore::default());
    let t = feed(
        &[
            row("1", "48.85", "2.35", "http://a", "1.0"),
            row("2", "91.0", "2.35", "http://b", "1.0"),
        ],
        None,
    );
    let scheduler = CycleScheduler::new(
        Arc::new(pipeline(t, store.clone(), 1)),
        Duration::from_secs(3600),
    );
    scheduler.run_once().await;
    assert_eq!(store.current().generation(), 1);

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "ingest_cycles_total",
        "outcome=\"published\"",
        "ingest_rows_dropped_total",
        "reason=\"out_of_range\"",
        "ingest_events_kept_total",
        "ingest_fetch_ms",
        "snapshot_generation",
        "snapshot_features",
        "ingest_pipeline_last_run_ts",
    ] {
        assert!(text.contains(needle), "missing `{needle}` in:\n{text}");
    }
}
