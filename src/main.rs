//! Economic newsletter service: binary entrypoint.
//! Loads configuration, wires the store, model clients, batch coordinator and feed
//! providers, starts the background scheduler and serves the Axum router.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use econ_newsletter::ai_adapter::{build_client, ServiceRole};
use econ_newsletter::analyze::{ItemAnalyzer, Translator};
use econ_newsletter::api::{create_router, AppState};
use econ_newsletter::batch::{BatchCoordinator, BatchSettings};
use econ_newsletter::config::feeds::{load_feeds_default, seed_feeds};
use econ_newsletter::config::{AiConfig, PipelineConfig};
use econ_newsletter::digest::DigestSynthesizer;
use econ_newsletter::ingest::build_providers;
use econ_newsletter::ingest::scheduler::{spawn_scheduler, AnalysisJob};
use econ_newsletter::metrics::Metrics;
use econ_newsletter::store::{DynStore, NullStore, PgStore};
use econ_newsletter::surface::ReadSurface;

/// Compact logs by default, JSON lines with `LOG_FORMAT=json`.
/// Skipped quietly if the runtime already installed a subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("econ_newsletter=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        warn!("tracing subscriber already installed; keeping it");
    }
}

async fn open_store(cfg: &PipelineConfig) -> DynStore {
    let Some(url) = cfg.database_url.as_deref() else {
        info!(target: "store", "no DATABASE_URL; running memory-only");
        return Arc::new(NullStore);
    };
    match PgStore::connect(url).await {
        Ok(pg) => {
            info!(target: "store", "postgres store connected");
            Arc::new(pg)
        }
        Err(e) => {
            warn!(target: "store", error = %e, "postgres unavailable; running memory-only");
            Arc::new(NullStore)
        }
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::from_env();
    let ai = AiConfig::load_default();
    let store = open_store(&cfg).await;

    let analysis_client = build_client(&ai, ServiceRole::Analysis);
    let digest_client = build_client(&ai, ServiceRole::Digest);
    info!(
        analysis = analysis_client.provider_name(),
        digest = digest_client.provider_name(),
        "model clients ready"
    );

    let coordinator = BatchCoordinator::new(
        ItemAnalyzer::new(analysis_client.clone(), ai.language.clone()),
        DigestSynthesizer::new(digest_client, ai.language.clone(), cfg.digest_top_n),
        store,
        ReadSurface::new(),
        BatchSettings::from(&cfg),
    );

    let feeds = load_feeds_default().unwrap_or_else(|e| {
        warn!(target: "ingest", error = %e, "feeds config unusable; using built-in sources");
        seed_feeds()
    });
    let providers = build_providers(&feeds).context("building feed providers")?;
    info!(target: "ingest", sources = providers.len(), "feed providers ready");

    let mut job = AnalysisJob::new(Arc::new(coordinator), Arc::new(providers), cfg);
    if ai.translate {
        job = job.with_translator(Translator::new(analysis_client, ai.language.clone()));
        info!(target: "ingest", language = %ai.language, "feed translation enabled");
    }
    spawn_scheduler(job.clone());

    let mut router = create_router(AppState::new(job));
    match Metrics::init() {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => warn!(error = %e, "metrics exporter disabled"),
    }

    Ok(router.into())
}
