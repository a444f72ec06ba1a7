// src/api.rs
//! Read Service: serves the current snapshot to map clients. Handlers only ever take
//! the current `Arc<Snapshot>`; they never wait on an ingest cycle.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::sync::Notify;
use tower_http::cors::CorsLayer;

use crate::snapshot::{SnapshotMeta, SnapshotStore};

pub const GEOJSON_CONTENT_TYPE: &str = "application/geo+json";
pub const GENERATION_HEADER: &str = "x-snapshot-generation";

#[derive(Clone)]
pub struct AppState {
    pub snapshots: Arc<SnapshotStore>,
    pub refresh: Arc<Notify>,
}

impl AppState {
    pub fn new(snapshots: Arc<SnapshotStore>, refresh: Arc<Notify>) -> Self {
        Self { snapshots, refresh }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { "ok" }))
        .route("/api/news", get(news))
        .route("/api/news/meta", get(news_meta))
        .route("/admin/refresh", post(refresh))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct RootOut {
    status: &'static str,
    generation: u64,
}

async fn root(State(state): State<AppState>) -> Json<RootOut> {
    Json(RootOut {
        status: "running",
        generation: state.snapshots.current().generation(),
    })
}

async fn news(State(state): State<AppState>) -> Response {
    let snap = state.snapshots.current();
    let generation = HeaderValue::from(snap.generation());
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(GEOJSON_CONTENT_TYPE)),
            (HeaderName::from_static(GENERATION_HEADER), generation),
        ],
        Body::from(snap.body_bytes()),
    )
        .into_response()
}

async fn news_meta(State(state): State<AppState>) -> Json<SnapshotMeta> {
    Json(state.snapshots.current().meta().clone())
}

async fn refresh(State(state): State<AppState>) -> impl IntoResponse {
    state.refresh.notify_one();
    (StatusCode::ACCEPTED, "queued")
}
