// src/geojson.rs
//! The published document: a GeoJSON FeatureCollection of point features.
//! Property names are the wire contract map clients read; keep them stable.

use serde::{Deserialize, Serialize};

use crate::ingest::types::ValidatedEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub geometry: Point,
    pub properties: EventProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Point")]
pub struct Point {
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventProperties {
    #[serde(rename = "SourceURL")]
    pub source_url: String,
    #[serde(rename = "EventCode")]
    pub event_code: String,
    #[serde(rename = "Tone")]
    pub tone: Option<f64>,
    #[serde(
        rename = "GlobalEventID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub event_id: Option<String>,
}

impl From<&ValidatedEvent> for Feature {
    fn from(ev: &ValidatedEvent) -> Self {
        Feature {
            geometry: Point {
                coordinates: [ev.lon, ev.lat],
            },
            properties: EventProperties {
                source_url: ev.source_url.clone(),
                event_code: ev.event_code.clone(),
                tone: ev.tone,
                event_id: ev.event_id.clone(),
            },
        }
    }
}

impl FeatureCollection {
    pub fn empty() -> Self {
        Self {
            features: Vec::new(),
        }
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a ValidatedEvent>) -> Self {
        Self {
            features: events.into_iter().map(Feature::from).collect(),
        }
    }
}
