// src/snapshot.rs
//! Snapshot Publisher: immutable published documents behind one swappable reference.
//!
//! Readers clone the current `Arc<Snapshot>` and keep serving it for as long as they
//! like; the publisher builds a complete new snapshot off to the side and only then
//! replaces the reference. A reader therefore sees the old document or the new one,
//! never a mix.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use axum::body::Bytes;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};

use crate::geojson::FeatureCollection;
use crate::ingest::aggregate::EventSet;
use crate::ingest::error::{EmptyResultError, PublishError};
use crate::ingest::types::ExportWindow;

/// Descriptive header of a snapshot, served on `/api/news/meta` and mirrored next to
/// the document on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub generation: u64,
    pub published_at: Option<DateTime<Utc>>,
    pub windows: Vec<String>,
    pub feature_count: usize,
}

#[derive(Debug)]
pub struct Snapshot {
    meta: SnapshotMeta,
    body: Bytes,
}

impl Snapshot {
    /// Generation 0: what readers get before anything was ever published.
    pub fn empty() -> Self {
        Self {
            meta: SnapshotMeta {
                generation: 0,
                published_at: None,
                windows: Vec::new(),
                feature_count: 0,
            },
            body: Bytes::from_static(br#"{"type":"FeatureCollection","features":[]}"#),
        }
    }

    pub fn generation(&self) -> u64 {
        self.meta.generation
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.meta.published_at
    }

    pub fn feature_count(&self) -> usize {
        self.meta.feature_count
    }

    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    /// The serialized GeoJSON document, exactly as served.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Shares the encoded document without copying it.
    pub fn body_bytes(&self) -> Bytes {
        self.body.clone()
    }

    pub fn document(&self) -> serde_json::Result<FeatureCollection> {
        serde_json::from_slice(&self.body)
    }
}

/// Holder of the "current snapshot" reference. One writer, any number of readers.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(Snapshot::empty())
    }
}

impl SnapshotStore {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        // A poisoned lock still holds a complete snapshot; keep serving it.
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Assigns the next generation and swaps it in. The lock is held only for the
    /// pointer replacement; the document was encoded before.
    fn install(&self, body: Bytes, windows: Vec<String>, feature_count: usize) -> Arc<Snapshot> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(Snapshot {
            meta: SnapshotMeta {
                generation: guard.generation() + 1,
                published_at: Some(Utc::now()),
                windows,
                feature_count,
            },
            body,
        });
        *guard = next.clone();
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Refuse to replace the current snapshot with an empty one.
    #[default]
    Guarded,
    /// Explicit override: an empty result is published like any other.
    AllowEmpty,
}

pub struct Publisher {
    store: Arc<SnapshotStore>,
    mirror: Option<SnapshotMirror>,
    mode: PublishMode,
}

impl Publisher {
    pub fn new(store: Arc<SnapshotStore>, mode: PublishMode) -> Self {
        Self {
            store,
            mirror: None,
            mode,
        }
    }

    pub fn with_mirror(mut self, mirror: SnapshotMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn publish(
        &self,
        set: &EventSet,
        windows: &[ExportWindow],
    ) -> Result<Arc<Snapshot>, PublishError> {
        if set.is_empty() && self.mode == PublishMode::Guarded {
            let current_generation = self.store.current().generation();
            counter!("ingest_publish_suppressed_total").increment(1);
            tracing::warn!(
                target: "ingest",
                generation = current_generation,
                "empty event set, keeping previous snapshot"
            );
            return Err(EmptyResultError { current_generation }.into());
        }

        let doc = FeatureCollection::from_events(set.sorted());
        let body = Bytes::from(serde_json::to_vec(&doc)?);
        let labels = windows.iter().map(ExportWindow::label).collect();

        let snap = self.store.install(body, labels, doc.features.len());

        gauge!("snapshot_generation").set(snap.generation() as f64);
        gauge!("snapshot_features").set(snap.feature_count() as f64);
        tracing::info!(
            target: "ingest",
            generation = snap.generation(),
            features = snap.feature_count(),
            "snapshot published"
        );

        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.write(&snap) {
                tracing::warn!(target: "ingest", error = ?e, "snapshot mirror write failed");
            }
        }

        Ok(snap)
    }
}

/// On-disk copy of the current snapshot for restart recovery.
///
/// The document goes to `path`, its [`SnapshotMeta`] to `path` + `.meta.json`. Both are
/// written to a temp file first and renamed into place.
#[derive(Debug, Clone)]
pub struct SnapshotMirror {
    path: PathBuf,
}

impl SnapshotMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn meta_path(&self) -> PathBuf {
        let mut p = self.path.clone().into_os_string();
        p.push(".meta.json");
        PathBuf::from(p)
    }

    pub fn write(&self, snap: &Snapshot) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating mirror dir {}", dir.display()))?;
        }
        let meta = serde_json::to_vec_pretty(snap.meta()).context("encoding snapshot meta")?;
        write_atomic(&self.path, snap.body())?;
        write_atomic(&self.meta_path(), &meta)?;
        Ok(())
    }

    /// `Ok(None)` when nothing was mirrored yet.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        let body = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()))
            }
        };
        let doc: FeatureCollection = serde_json::from_slice(&body)
            .with_context(|| format!("parsing mirrored document {}", self.path.display()))?;

        let meta = match fs::read(self.meta_path()) {
            Ok(raw) => serde_json::from_slice::<SnapshotMeta>(&raw).ok(),
            Err(_) => None,
        }
        .unwrap_or(SnapshotMeta {
            generation: 1,
            published_at: None,
            windows: Vec::new(),
            feature_count: doc.features.len(),
        });

        Ok(Some(Snapshot {
            meta: SnapshotMeta {
                feature_count: doc.features.len(),
                ..meta
            },
            body: Bytes::from(body),
        }))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.to_path_buf().into_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()));
    }
    Ok(())
}
