// src/ingest/aggregate.rs
use std::collections::HashMap;

use crate::ingest::types::{DedupKey, ExportWindow, ValidatedEvent};

/// Validated events of one fetched window.
#[derive(Debug, Clone)]
pub struct WindowEvents {
    pub window: ExportWindow,
    pub events: Vec<ValidatedEvent>,
}

/// Deduplicated union of all windows fetched in one cycle.
#[derive(Debug, Clone, Default)]
pub struct EventSet {
    events: HashMap<DedupKey, ValidatedEvent>,
    collapsed: usize,
}

impl EventSet {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, key: &DedupKey) -> Option<&ValidatedEvent> {
        self.events.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidatedEvent> {
        self.events.values()
    }

    /// Observations that were folded into an existing key.
    pub fn duplicates_collapsed(&self) -> usize {
        self.collapsed
    }

    /// Members ordered by dedup key, so identical sets always render identically.
    pub fn sorted(&self) -> Vec<&ValidatedEvent> {
        let mut keyed: Vec<_> = self.events.iter().collect();
        keyed.sort_by(|a, b| a.0.cmp(b.0));
        keyed.into_iter().map(|(_, ev)| ev).collect()
    }

    fn insert(&mut self, ev: ValidatedEvent) {
        if self.events.insert(ev.dedup_key(), ev).is_some() {
            self.collapsed += 1;
        }
    }
}

/// Merge windows oldest → newest; a later observation of a key replaces the earlier
/// one, so the most recent window wins ties.
pub fn aggregate(mut windows: Vec<WindowEvents>) -> EventSet {
    windows.sort_by_key(|w| w.window.timestamp);

    let mut set = EventSet::default();
    for w in windows {
        for ev in w.events {
            set.insert(ev);
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::WINDOW_TS_FORMAT;
    use chrono::NaiveDateTime;

    fn window(ts: &str) -> ExportWindow {
        ExportWindow {
            timestamp: NaiveDateTime::parse_from_str(ts, WINDOW_TS_FORMAT).unwrap(),
            url: format!("http://x/{ts}.export.CSV.zip"),
            expected_size: None,
            checksum: None,
        }
    }

    fn ev(id: Option<&str>, url: &str, tone: f64) -> ValidatedEvent {
        ValidatedEvent {
            event_id: id.map(str::to_string),
            event_code: "010".into(),
            source_url: url.into(),
            lat: 10.0,
            lon: 20.0,
            tone: Some(tone),
        }
    }

    #[test]
    fn newer_window_wins_regardless_of_input_order() {
        let older = WindowEvents {
            window: window("20260226220000"),
            events: vec![ev(Some("E1"), "http://a", 1.2), ev(Some("E2"), "http://b", 0.0)],
        };
        let newer = WindowEvents {
            window: window("20260226221500"),
            events: vec![ev(Some("E1"), "http://a", 3.4)],
        };

        let set = aggregate(vec![newer, older]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.duplicates_collapsed(), 1);
        let e1 = set.get(&DedupKey::Id("E1".into())).unwrap();
        assert_eq!(e1.tone, Some(3.4));
    }

    #[test]
    fn id_less_events_collapse_on_derived_key() {
        let a = WindowEvents {
            window: window("20260226220000"),
            events: vec![ev(None, "http://a", 1.0)],
        };
        let b = WindowEvents {
            window: window("20260226221500"),
            events: vec![ev(None, "http://a", 2.0), ev(None, "http://other", 2.0)],
        };
        let set = aggregate(vec![a, b]);
        assert_eq!(set.len(), 2);
        assert!(set.iter().any(|e| e.source_url == "http://a" && e.tone == Some(2.0)));
    }

    #[test]
    fn no_windows_is_empty() {
        let set = aggregate(vec![]);
        assert!(set.is_empty());
        assert!(set.sorted().is_empty());
    }

    #[test]
    fn sorted_order_is_stable() {
        let w = WindowEvents {
            window: window("20260226221500"),
            events: vec![ev(Some("B"), "http://b", 0.0), ev(Some("A"), "http://a", 0.0)],
        };
        let set = aggregate(vec![w]);
        let ids: Vec<_> = set
            .sorted()
            .iter()
            .map(|e| e.event_id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
    }
}
