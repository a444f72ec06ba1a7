// src/ingest/parser.rs
//! Record Parser/Validator.
//!
//! The export is a headerless tab-separated file with a fixed column order. Only the
//! six columns the map needs are read, by position, so drift in any other column
//! cannot break ingestion. Every rejected row is dropped on its own and counted.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::ingest::codec;
use crate::ingest::error::{CodecError, ParseError};
use crate::ingest::types::{RawRecord, ValidatedEvent};

/// Zero-based column positions of the fields we keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub event_id: usize,
    pub event_code: usize,
    pub tone: usize,
    pub lat: usize,
    pub lon: usize,
    pub source_url: usize,
}

impl ColumnLayout {
    /// GDELT 2.0 event export (61 columns, ActionGeo block includes ADM2).
    pub const GDELT_V2: ColumnLayout = ColumnLayout {
        event_id: 0,
        event_code: 26,
        tone: 34,
        lat: 56,
        lon: 57,
        source_url: 60,
    };

    /// 51-column schema without the ADM2 geo fields.
    pub const LEGACY: ColumnLayout = ColumnLayout {
        event_id: 0,
        event_code: 26,
        tone: 34,
        lat: 46,
        lon: 47,
        source_url: 50,
    };

    pub fn min_columns(&self) -> usize {
        [
            self.event_id,
            self.event_code,
            self.tone,
            self.lat,
            self.lon,
            self.source_url,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

/// Named layout presets, as written in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutName {
    #[default]
    V2,
    Legacy,
}

impl LayoutName {
    pub fn columns(self) -> ColumnLayout {
        match self {
            LayoutName::V2 => ColumnLayout::GDELT_V2,
            LayoutName::Legacy => ColumnLayout::LEGACY,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v2" | "gdelt_v2" => Some(LayoutName::V2),
            "legacy" | "v1" => Some(LayoutName::Legacy),
            _ => None,
        }
    }
}

/// Lazily decodes payload lines into raw records. Blank lines are skipped.
pub fn raw_records(
    text: &[u8],
    layout: ColumnLayout,
) -> impl Iterator<Item = Result<RawRecord<'_>, ParseError>> {
    text.split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(move |line| decode_row(line, layout))
}

fn decode_row(line: &[u8], layout: ColumnLayout) -> Result<RawRecord<'_>, ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::Encoding)?;
    let cols: Vec<&str> = line.split('\t').collect();

    let expected = layout.min_columns();
    if cols.len() < expected {
        return Err(ParseError::TooFewColumns {
            found: cols.len(),
            expected,
        });
    }

    Ok(RawRecord {
        event_id: cols[layout.event_id],
        event_code: cols[layout.event_code],
        source_url: cols[layout.source_url],
        lat: cols[layout.lat],
        lon: cols[layout.lon],
        tone: cols[layout.tone],
    })
}

/// Strict numeric parse: no zero-substitution, NaN and infinities rejected.
fn parse_coordinate(field: &str) -> Result<f64, ParseError> {
    let t = field.trim();
    if t.is_empty() {
        return Err(ParseError::MissingCoordinates);
    }
    match t.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::BadCoordinate(t.to_string())),
    }
}

fn non_empty(field: &str) -> Option<String> {
    let t = field.trim();
    (!t.is_empty()).then(|| t.to_string())
}

pub fn validate(raw: &RawRecord<'_>) -> Result<ValidatedEvent, ParseError> {
    let lat = parse_coordinate(raw.lat)?;
    let lon = parse_coordinate(raw.lon)?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(ParseError::OutOfRange { lat, lon });
    }

    let source_url = non_empty(raw.source_url).ok_or(ParseError::EmptySource)?;

    // Tone is optional; an unreadable score degrades to "no score", not a dropped row.
    let tone = raw
        .tone
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite());

    Ok(ValidatedEvent {
        event_id: non_empty(raw.event_id),
        event_code: raw.event_code.trim().to_string(),
        source_url,
        lat,
        lon,
        tone,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub rows: usize,
    pub kept: usize,
    pub dropped: BTreeMap<&'static str, usize>,
}

impl ParseStats {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }

    fn record(&mut self, outcome: &Result<ValidatedEvent, ParseError>) {
        self.rows += 1;
        match outcome {
            Ok(_) => self.kept += 1,
            Err(e) => *self.dropped.entry(e.reason()).or_default() += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedWindow {
    pub events: Vec<ValidatedEvent>,
    pub stats: ParseStats,
}

/// Validates an already-decompressed payload.
pub fn parse_text(text: &[u8], layout: ColumnLayout) -> ParsedWindow {
    let mut out = ParsedWindow::default();
    for row in raw_records(text, layout) {
        let outcome = row.and_then(|raw| validate(&raw));
        out.stats.record(&outcome);
        if let Ok(ev) = outcome {
            out.events.push(ev);
        }
    }
    out
}

/// Decompresses and validates one window's payload. Only a broken container fails the
/// window; bad rows never do.
pub fn parse_window(payload: &[u8], layout: ColumnLayout) -> Result<ParsedWindow, CodecError> {
    let text = codec::decompress(payload)?;
    Ok(parse_text(&text, layout))
}
