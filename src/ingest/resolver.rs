// src/ingest/resolver.rs
//! Window Resolver: reads the upstream `lastupdate.txt` manifest and turns the export
//! entry into the windows this cycle should fetch.

use std::sync::Arc;

use chrono::{NaiveDateTime, Timelike};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::ingest::error::ResolutionError;
use crate::ingest::transport::Transport;
use crate::ingest::types::{ExportWindow, WINDOW_MINUTES, WINDOW_TS_FORMAT};

pub struct WindowResolver {
    transport: Arc<dyn Transport>,
    manifest_url: String,
    marker: String,
    window_count: usize,
}

impl WindowResolver {
    pub fn new(
        transport: Arc<dyn Transport>,
        manifest_url: impl Into<String>,
        marker: impl Into<String>,
        window_count: usize,
    ) -> Self {
        Self {
            transport,
            manifest_url: manifest_url.into(),
            marker: marker.into(),
            window_count: window_count.clamp(1, 2),
        }
    }

    /// Oldest first: `[latest]` or `[previous, latest]`.
    pub async fn resolve(&self) -> Result<Vec<ExportWindow>, ResolutionError> {
        let bytes = self
            .transport
            .get(&self.manifest_url)
            .await
            .map_err(ResolutionError::Unreachable)?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| ResolutionError::Malformed("manifest is not UTF-8".into()))?;

        let latest = parse_manifest(text, &self.marker)?;
        tracing::debug!(target: "ingest", window = %latest.label(), "manifest resolved");

        Ok(if self.window_count >= 2 {
            vec![latest.preceding(), latest]
        } else {
            vec![latest]
        })
    }
}

fn file_ts_regex() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^(\d{14})\.").expect("window timestamp regex"))
}

/// Pick the manifest line whose artifact name contains `marker` and derive its window.
///
/// Lines look like `<size> <checksum> <url>`. When several lines match, the newest
/// timestamp wins.
pub fn parse_manifest(text: &str, marker: &str) -> Result<ExportWindow, ResolutionError> {
    let mut best: Option<ExportWindow> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut parts = line.split_whitespace();
        let (Some(size), Some(checksum), Some(url)) = (parts.next(), parts.next(), parts.next())
        else {
            // Not an entry we can reason about; only fatal if it was the export line.
            if line.contains(marker) {
                return Err(ResolutionError::Malformed(format!(
                    "expected `<size> <checksum> <url>`, got `{line}`"
                )));
            }
            continue;
        };

        let file = url.rsplit('/').next().unwrap_or(url);
        if !file.contains(marker) {
            continue;
        }

        let window = parse_entry(size, checksum, url, file)?;
        if best.as_ref().map_or(true, |b| window.timestamp > b.timestamp) {
            best = Some(window);
        }
    }

    best.ok_or_else(|| ResolutionError::NoEntry(marker.to_string()))
}

fn parse_entry(
    size: &str,
    checksum: &str,
    url: &str,
    file: &str,
) -> Result<ExportWindow, ResolutionError> {
    let expected_size = size
        .parse::<u64>()
        .map_err(|_| ResolutionError::Malformed(format!("size `{size}` is not a number")))?;

    let ts = file_ts_regex()
        .captures(file)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            ResolutionError::Malformed(format!("`{file}` does not start with a timestamp"))
        })?;

    let timestamp = NaiveDateTime::parse_from_str(ts, WINDOW_TS_FORMAT)
        .map_err(|e| ResolutionError::Malformed(format!("timestamp `{ts}`: {e}")))?;
    if timestamp.second() != 0 || i64::from(timestamp.minute()) % WINDOW_MINUTES != 0 {
        return Err(ResolutionError::Malformed(format!(
            "timestamp `{ts}` is not on the {WINDOW_MINUTES}-minute grid"
        )));
    }

    Ok(ExportWindow {
        timestamp,
        url: url.to_string(),
        expected_size: Some(expected_size),
        checksum: Some(checksum.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::error::TransportError;
    use crate::ingest::transport::StaticTransport;

    const MANIFEST: &str = "\
148163 9c7b3b3a1b3f0c1d http://data.gdeltproject.org/gdeltv2/20260226221500.export.CSV.zip
202071 0aa4e5f0d3c1b2a9 http://data.gdeltproject.org/gdeltv2/20260226221500.mentions.CSV.zip
6543210 77de68daecd823ba http://data.gdeltproject.org/gdeltv2/20260226221500.gkg.csv.zip
";

    #[test]
    fn picks_export_line() {
        let w = parse_manifest(MANIFEST, ".export.").unwrap();
        assert_eq!(w.label(), "20260226221500");
        assert_eq!(w.expected_size, Some(148163));
        assert_eq!(w.checksum.as_deref(), Some("9c7b3b3a1b3f0c1d"));
        assert!(w.url.ends_with("20260226221500.export.CSV.zip"));
    }

    #[test]
    fn missing_export_line_is_no_entry() {
        let text = "1 a http://x/20260226221500.gkg.csv.zip\n";
        assert!(matches!(
            parse_manifest(text, ".export."),
            Err(ResolutionError::NoEntry(_))
        ));
        assert!(matches!(
            parse_manifest("", ".export."),
            Err(ResolutionError::NoEntry(_))
        ));
    }

    #[test]
    fn truncated_export_line_is_malformed() {
        let text = "148163 http://x/20260226221500.export.CSV.zip\n";
        assert!(matches!(
            parse_manifest(text, ".export."),
            Err(ResolutionError::Malformed(_))
        ));
    }

    #[test]
    fn off_grid_timestamp_is_malformed() {
        let text = "1 a http://x/20260226221700.export.CSV.zip\n";
        assert!(matches!(
            parse_manifest(text, ".export."),
            Err(ResolutionError::Malformed(_))
        ));
        let text = "1 a http://x/2026022622.export.CSV.zip\n";
        assert!(matches!(
            parse_manifest(text, ".export."),
            Err(ResolutionError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn resolves_latest_and_previous_without_second_manifest_call() {
        let t = Arc::new(StaticTransport::new().with_body("http://m/lastupdate.txt", MANIFEST));
        let r = WindowResolver::new(t.clone(), "http://m/lastupdate.txt", ".export.", 2);
        let windows = r.resolve().await.unwrap();
        let labels: Vec<_> = windows.iter().map(|w| w.label()).collect();
        assert_eq!(labels, vec!["20260226220000", "20260226221500"]);
        assert_eq!(t.calls("http://m/lastupdate.txt"), 1);
    }

    #[tokio::test]
    async fn single_window_mode() {
        let t = Arc::new(StaticTransport::new().with_body("http://m/lastupdate.txt", MANIFEST));
        let r = WindowResolver::new(t, "http://m/lastupdate.txt", ".export.", 1);
        assert_eq!(r.resolve().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_manifest() {
        let t = Arc::new(StaticTransport::new().with_error(
            "http://m/lastupdate.txt",
            TransportError::Timeout {
                url: "http://m/lastupdate.txt".into(),
            },
        ));
        let r = WindowResolver::new(t, "http://m/lastupdate.txt", ".export.", 2);
        assert!(matches!(
            r.resolve().await,
            Err(ResolutionError::Unreachable(_))
        ));
    }
}
