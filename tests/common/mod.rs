// tests/common/mod.rs
// Shared fixtures: synthetic export rows, gzip payloads, manifests, wired pipelines.
#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;

use live_event_map::ingest::config::IngestConfig;
use live_event_map::ingest::parser::ColumnLayout;
use live_event_map::ingest::transport::StaticTransport;
use live_event_map::{Pipeline, SnapshotStore};

pub const MANIFEST_URL: &str = "http://feed.test/gdeltv2/lastupdate.txt";
pub const LATEST: &str = "20260226221500";
pub const PREVIOUS: &str = "20260226220000";

pub fn export_url(ts: &str) -> String {
    format!("http://feed.test/gdeltv2/{ts}.export.CSV.gz")
}

#[derive(Debug, Clone)]
pub struct Row {
    pub id: String,
    pub code: String,
    pub lat: String,
    pub lon: String,
    pub url: String,
    pub tone: String,
}

pub fn row(id: &str, lat: &str, lon: &str, url: &str, tone: &str) -> Row {
    Row {
        id: id.into(),
        code: "043".into(),
        lat: lat.into(),
        lon: lon.into(),
        url: url.into(),
        tone: tone.into(),
    }
}

impl Row {
    /// Full-width tab-separated line in the GDELT 2.0 layout.
    pub fn line(&self) -> String {
        let l = ColumnLayout::GDELT_V2;
        let mut cols = vec!["x".to_string(); l.min_columns()];
        cols[l.event_id] = self.id.clone();
        cols[l.event_code] = self.code.clone();
        cols[l.lat] = self.lat.clone();
        cols[l.lon] = self.lon.clone();
        cols[l.source_url] = self.url.clone();
        cols[l.tone] = self.tone.clone();
        cols.join("\t")
    }
}

pub fn gzip_rows(rows: &[Row]) -> Vec<u8> {
    let mut text = rows.iter().map(Row::line).collect::<Vec<_>>().join("\n");
    text.push('\n');
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(text.as_bytes()).expect("gzip write");
    enc.finish().expect("gzip finish")
}

/// Manifest advertising `ts` with the exact size of `payload`.
pub fn manifest(ts: &str, payload: &[u8]) -> String {
    format!(
        "{} 0123456789abcdef {}\n\
         1024 fedcba9876543210 http://feed.test/gdeltv2/{ts}.mentions.CSV.zip\n\
         2048 00aa00aa00aa00aa http://feed.test/gdeltv2/{ts}.gkg.csv.zip\n",
        payload.len(),
        export_url(ts)
    )
}

pub fn test_config(window_count: usize) -> IngestConfig {
    IngestConfig {
        manifest_url: MANIFEST_URL.into(),
        window_count,
        max_retries: 1,
        base_delay_ms: 1,
        max_delay_ms: 2,
        metrics_enabled: false,
        ..IngestConfig::default()
    }
}

pub fn pipeline(
    transport: Arc<StaticTransport>,
    store: Arc<SnapshotStore>,
    window_count: usize,
) -> Pipeline {
    Pipeline::from_config(&test_config(window_count), transport, store)
}

/// Transport serving a manifest for LATEST plus the given window payloads.
pub fn feed(latest: &[Row], previous: Option<&[Row]>) -> Arc<StaticTransport> {
    let latest_payload = gzip_rows(latest);
    let t = StaticTransport::new()
        .with_body(MANIFEST_URL, manifest(LATEST, &latest_payload))
        .with_body(&export_url(LATEST), latest_payload);
    let t = match previous {
        Some(rows) => t.with_body(&export_url(PREVIOUS), gzip_rows(rows)),
        None => t,
    };
    Arc::new(t)
}
