// src/ingest/types.rs
use chrono::{NaiveDateTime, TimeDelta};

/// Upstream publishes one export every 15 minutes.
pub const WINDOW_MINUTES: i64 = 15;

pub fn window_interval() -> TimeDelta {
    TimeDelta::minutes(WINDOW_MINUTES)
}

/// File-name timestamp format of the export artifacts (`20260226221500`).
pub const WINDOW_TS_FORMAT: &str = "%Y%m%d%H%M%S";

/// One remote export batch, identified by its 15-minute timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportWindow {
    pub timestamp: NaiveDateTime,
    pub url: String,
    /// Byte size advertised by the manifest (only known for the manifest entry itself).
    pub expected_size: Option<u64>,
    pub checksum: Option<String>,
}

impl ExportWindow {
    pub fn label(&self) -> String {
        self.timestamp.format(WINDOW_TS_FORMAT).to_string()
    }

    /// The window published one interval earlier. The URL is derived by swapping the
    /// timestamp inside the file name, so no second manifest round trip is needed.
    pub fn preceding(&self) -> ExportWindow {
        let timestamp = self.timestamp - window_interval();
        let old_label = self.label();
        let new_label = timestamp.format(WINDOW_TS_FORMAT).to_string();

        let url = match self.url.rfind('/') {
            Some(idx) => {
                let (dir, file) = self.url.split_at(idx + 1);
                format!("{dir}{}", file.replacen(&old_label, &new_label, 1))
            }
            None => self.url.replacen(&old_label, &new_label, 1),
        };

        ExportWindow {
            timestamp,
            url,
            expected_size: None,
            checksum: None,
        }
    }
}

/// One decoded row, borrowed straight from the payload line. Nothing is validated yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    pub event_id: &'a str,
    pub event_code: &'a str,
    pub source_url: &'a str,
    pub lat: &'a str,
    pub lon: &'a str,
    pub tone: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedEvent {
    pub event_id: Option<String>,
    pub event_code: String,
    pub source_url: String,
    pub lat: f64,
    pub lon: f64,
    pub tone: Option<f64>,
}

/// Identity used to collapse repeated observations of one event across windows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DedupKey {
    Id(String),
    Derived {
        source_url: String,
        event_code: String,
        lat_e4: i64,
        lon_e4: i64,
    },
}

/// Coordinates are rounded to 4 decimals (~11 m) before they take part in a derived key.
fn round_e4(v: f64) -> i64 {
    (v * 10_000.0).round() as i64
}

impl ValidatedEvent {
    pub fn dedup_key(&self) -> DedupKey {
        match &self.event_id {
            Some(id) => DedupKey::Id(id.clone()),
            None => DedupKey::Derived {
                source_url: self.source_url.clone(),
                event_code: self.event_code.clone(),
                lat_e4: round_e4(self.lat),
                lon_e4: round_e4(self.lon),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(ts: &str) -> ExportWindow {
        ExportWindow {
            timestamp: NaiveDateTime::parse_from_str(ts, WINDOW_TS_FORMAT).unwrap(),
            url: format!("http://data.gdeltproject.org/gdeltv2/{ts}.export.CSV.zip"),
            expected_size: Some(10),
            checksum: Some("abc".into()),
        }
    }

    #[test]
    fn preceding_window_is_one_interval_back() {
        let w = window("20260226221500");
        let prev = w.preceding();
        assert_eq!(prev.label(), "20260226220000");
        assert_eq!(
            prev.url,
            "http://data.gdeltproject.org/gdeltv2/20260226220000.export.CSV.zip"
        );
        assert_eq!(prev.expected_size, None);
    }

    #[test]
    fn preceding_crosses_midnight() {
        let prev = window("20260227000000").preceding();
        assert_eq!(prev.label(), "20260226234500");
        assert!(prev.url.ends_with("/20260226234500.export.CSV.zip"));
    }

    #[test]
    fn dedup_key_prefers_event_id() {
        let ev = ValidatedEvent {
            event_id: Some("E1".into()),
            event_code: "010".into(),
            source_url: "http://a".into(),
            lat: 1.0,
            lon: 2.0,
            tone: None,
        };
        assert_eq!(ev.dedup_key(), DedupKey::Id("E1".into()));
    }

    #[test]
    fn derived_key_absorbs_tiny_coordinate_noise() {
        let a = ValidatedEvent {
            event_id: None,
            event_code: "190".into(),
            source_url: "http://a".into(),
            lat: 48.85661,
            lon: 2.35222,
            tone: Some(1.0),
        };
        let b = ValidatedEvent {
            lat: 48.85659,
            tone: Some(-3.0),
            ..a.clone()
        };
        assert_eq!(a.dedup_key(), b.dedup_key());

        let c = ValidatedEvent {
            event_code: "191".into(),
            ..a.clone()
        };
        assert_ne!(a.dedup_key(), c.dedup_key());
    }
}
