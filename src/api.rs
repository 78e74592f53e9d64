use serde::Serialize;
use shuttle_axum::axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::batch::AlreadyRunning;
use crate::ingest::scheduler::AnalysisJob;
use crate::ingest::{list_sources, SourceListing};
use crate::surface::{ReadSurface, SurfaceSnapshot};

/// Entries shown per source by the live listing.
const LISTING_PER_SOURCE: usize = 3;

#[derive(Clone)]
pub struct AppState {
    pub surface: ReadSurface,
    pub job: AnalysisJob,
}

impl AppState {
    pub fn new(job: AnalysisJob) -> Self {
        Self {
            surface: job.coordinator().surface().clone(),
            job,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/articles", get(articles))
        .route("/api/refresh", post(refresh))
        .route("/api/rss-sources", get(rss_sources))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn articles(State(state): State<AppState>) -> Json<SurfaceSnapshot> {
    Json(state.surface.snapshot())
}

#[derive(Serialize)]
struct RefreshResp {
    success: bool,
    message: &'static str,
}

async fn refresh(State(state): State<AppState>) -> (StatusCode, Json<RefreshResp>) {
    match state.job.spawn_run() {
        Ok(_handle) => {
            info!(target: "batch", "manual refresh started");
            (
                StatusCode::ACCEPTED,
                Json(RefreshResp {
                    success: true,
                    message: "refresh started",
                }),
            )
        }
        Err(AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(RefreshResp {
                success: false,
                message: "a refresh is already running",
            }),
        ),
    }
}

#[derive(Serialize)]
struct SourcesResp {
    sources: Vec<SourceListing>,
}

async fn rss_sources(State(state): State<AppState>) -> Json<SourcesResp> {
    let sources = list_sources(state.job.providers(), LISTING_PER_SOURCE).await;
    Json(SourcesResp { sources })
}
