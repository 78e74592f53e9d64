use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Installs the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_pipeline_metrics();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time registration of the batch/analysis series.
pub fn describe_pipeline_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("batch_runs_total", "Completed batch runs.");
        describe_counter!(
            "batch_refused_total",
            "Batch runs refused because one was already in flight."
        );
        describe_counter!(
            "analysis_cache_hits_total",
            "Items whose stored analysis was reused."
        );
        describe_counter!(
            "analysis_service_calls_total",
            "Calls made to the analysis service."
        );
        describe_counter!(
            "analysis_repair_fallback_total",
            "Analyses recovered only through the summary fallback."
        );
        describe_counter!(
            "analysis_unrecoverable_total",
            "Model answers with no usable record."
        );
        describe_counter!("store_errors_total", "Failed store operations.");
        describe_counter!("digest_failures_total", "Digest calls that produced nothing.");
        describe_counter!("translation_calls_total", "Title/description translation calls.");
        describe_counter!(
            "translation_failures_total",
            "Translation calls that failed; the feed text was kept."
        );
        describe_gauge!("batch_last_run_ts", "Unix ts when the last batch completed.");
        describe_histogram!("analysis_call_ms", "Analysis call latency in milliseconds.");
    });
}
