// tests/restore.rs
mod common;

use std::fs;
use std::sync::Arc;

use common::*;
use live_event_map::ingest::config::IngestConfig;
use live_event_map::{restore_store, Pipeline, SnapshotStore};

fn mirrored_config(dir: &tempfile::TempDir) -> IngestConfig {
    IngestConfig {
        mirror_path: Some(dir.path().join("data").join("live_news.geojson")),
        ..test_config(1)
    }
}

#[tokio::test]
async fn restart_resumes_from_mirrored_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = mirrored_config(&dir);

    let store = Arc::new(SnapshotStore::default());
    let t = feed(
        &[
            row("1", "48.85", "2.35", "http://a", "1.0"),
            row("2", "40.71", "-74.0", "http://b", "-2.0"),
        ],
        None,
    );
    let pipeline = Pipeline::from_config(&cfg, t.clone(), store.clone());
    pipeline.run_cycle().await.unwrap();
    pipeline.run_cycle().await.unwrap();
    assert_eq!(store.current().generation(), 2);

    let restored = Arc::new(restore_store(&cfg));
    let snap = restored.current();
    assert_eq!(snap.generation(), 2);
    assert_eq!(snap.feature_count(), 2);
    assert_eq!(snap.body(), store.current().body());
    assert_eq!(snap.meta().windows, vec![LATEST.to_string()]);

    // generations keep counting from the restored value
    let report = Pipeline::from_config(&cfg, t, restored.clone())
        .run_cycle()
        .await
        .unwrap();
    assert_eq!(report.generation, 3);
}

#[test]
fn missing_or_broken_mirror_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = mirrored_config(&dir);
    assert_eq!(restore_store(&cfg).current().generation(), 0);

    let path = cfg.mirror_path.clone().unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"not json").unwrap();
    assert_eq!(restore_store(&cfg).current().generation(), 0);

    assert_eq!(restore_store(&test_config(1)).current().generation(), 0);
}
