// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET  /health
// - GET  /api/articles      (surface JSON before and after a run)
// - POST /api/refresh       (202 when started, 409 while a run is in flight)
// - GET  /api/rss-sources   (live listing, failing source keeps an empty list)

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use econ_newsletter::ai_adapter::{BudgetedClient, DynCompletion, MockProvider, ServiceRole};
use econ_newsletter::analyze::ItemAnalyzer;
use econ_newsletter::api::{create_router, AppState};
use econ_newsletter::batch::{BatchCoordinator, BatchSettings};
use econ_newsletter::config::{FeedSource, PipelineConfig};
use econ_newsletter::digest::{DigestSynthesizer, NO_DIGEST};
use econ_newsletter::ingest::rss::RssProvider;
use econ_newsletter::ingest::scheduler::AnalysisJob;
use econ_newsletter::ingest::types::FeedProvider;
use econ_newsletter::store::MemoryStore;
use econ_newsletter::surface::{ReadSurface, Status};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests
const FEED_XML: &str = include_str!("fixtures/econ_feed.xml");
const BROKEN_XML: &str = include_str!("fixtures/broken_feed.xml");

fn source(name: &str) -> FeedSource {
    FeedSource {
        name: name.to_string(),
        url: format!("https://{}.example/rss", name.to_lowercase()),
        category: "Piacok".to_string(),
    }
}

fn mock(role: ServiceRole) -> DynCompletion {
    Arc::new(BudgetedClient::in_memory(MockProvider::for_role(role), 100))
}

/// Same wiring as the binary, with mock model clients and fixture feeds.
fn test_job() -> AnalysisJob {
    let coordinator = BatchCoordinator::new(
        ItemAnalyzer::new(mock(ServiceRole::Analysis), "Hungarian"),
        DigestSynthesizer::new(mock(ServiceRole::Digest), "Hungarian", 10),
        Arc::new(MemoryStore::new()),
        ReadSurface::new(),
        BatchSettings::default(),
    );
    let providers: Vec<Box<dyn FeedProvider>> = vec![
        Box::new(RssProvider::from_fixture(source("Wire"), FEED_XML)),
        Box::new(RssProvider::from_fixture(source("Broken"), BROKEN_XML)),
    ];
    let cfg = PipelineConfig {
        // Fixture dates are fixed; keep them all inside the window.
        max_item_age_hours: 24 * 365 * 50,
        ..PipelineConfig::default()
    };
    AnalysisJob::new(Arc::new(coordinator), Arc::new(providers), cfg)
}

fn router_for(job: &AnalysisJob) -> Router {
    create_router(AppState::new(job.clone()))
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

async fn wait_for_completed(surface: &ReadSurface) {
    for _ in 0..200 {
        if surface.status() == Status::Completed {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run did not complete in time");
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let job = test_job();
    let (status, body) = send(router_for(&job), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK, "health should be 200");
    assert_eq!(String::from_utf8(body).expect("utf8"), "ok");
}

#[tokio::test]
async fn api_articles_before_any_run_is_idle_and_empty() {
    let job = test_job();
    let (status, body) = send(router_for(&job), "GET", "/api/articles").await;
    assert_eq!(status, StatusCode::OK);

    let v: Json = serde_json::from_slice(&body).expect("valid JSON");
    assert_eq!(v["status"], "idle");
    assert_eq!(v["digest"], NO_DIGEST);
    assert_eq!(v["run_count"], 0);
    assert!(v["items"].as_array().expect("items array").is_empty());
    assert!(v["last_update"].is_null());
}

#[tokio::test]
async fn api_refresh_starts_a_run_and_articles_reflect_it() {
    let job = test_job();
    let surface = job.coordinator().surface().clone();

    let (status, body) = send(router_for(&job), "POST", "/api/refresh").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let v: Json = serde_json::from_slice(&body).expect("valid JSON");
    assert_eq!(v["success"], true);

    wait_for_completed(&surface).await;

    let (status, body) = send(router_for(&job), "GET", "/api/articles").await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).expect("valid JSON");
    assert_eq!(v["status"], "completed");
    assert_eq!(v["run_count"], 1);
    assert_ne!(v["digest"], NO_DIGEST);

    let items = v["items"].as_array().expect("items array");
    assert_eq!(items.len(), 3, "three entries per source from the working feed");
    for it in items {
        assert!(it["importance_score"].is_u64());
        assert!(it["urgency"].is_string());
        assert!(it["original_title"].is_string());
    }
}

#[tokio::test]
async fn api_refresh_while_running_is_409() {
    let job = test_job();
    let _held = job.coordinator().try_start().expect("first claim");

    let (status, body) = send(router_for(&job), "POST", "/api/refresh").await;
    assert_eq!(status, StatusCode::CONFLICT);
    let v: Json = serde_json::from_slice(&body).expect("valid JSON");
    assert_eq!(v["success"], false);
    assert_eq!(job.coordinator().surface().status(), Status::Processing);
}

#[tokio::test]
async fn api_rss_sources_lists_every_configured_source() {
    let job = test_job();
    let (status, body) = send(router_for(&job), "GET", "/api/rss-sources").await;
    assert_eq!(status, StatusCode::OK);

    let v: Json = serde_json::from_slice(&body).expect("valid JSON");
    let sources = v["sources"].as_array().expect("sources array");
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0]["name"], "Wire");
    assert_eq!(sources[0]["articles"].as_array().unwrap().len(), 3);
    assert!(sources[0]["articles"][0]["pub_date"].is_string());
    assert_eq!(sources[1]["name"], "Broken");
    assert!(sources[1]["articles"].as_array().unwrap().is_empty());
}
