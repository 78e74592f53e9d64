// src/ingest/scheduler.rs
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::analyze::Translator;
use crate::batch::{AlreadyRunning, BatchCoordinator, BatchReport};
use crate::config::PipelineConfig;
use crate::ingest::collect_items;
use crate::ingest::types::FeedProvider;
use crate::surface::RunPermit;

/// One full-analysis job: poll feeds, translate, run the batch, prune old rows.
#[derive(Clone)]
pub struct AnalysisJob {
    coordinator: Arc<BatchCoordinator>,
    providers: Arc<Vec<Box<dyn FeedProvider>>>,
    translator: Option<Translator>,
    cfg: PipelineConfig,
}

impl AnalysisJob {
    pub fn new(
        coordinator: Arc<BatchCoordinator>,
        providers: Arc<Vec<Box<dyn FeedProvider>>>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            coordinator,
            providers,
            translator: None,
            cfg,
        }
    }

    /// Translates the items that will be analyzed before each run.
    pub fn with_translator(mut self, translator: Translator) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn coordinator(&self) -> &Arc<BatchCoordinator> {
        &self.coordinator
    }

    pub fn providers(&self) -> &[Box<dyn FeedProvider>] {
        &self.providers
    }

    /// Claims the run guard synchronously, then runs in the background.
    /// A refusal is returned before anything is spawned.
    pub fn spawn_run(&self) -> Result<JoinHandle<()>, AlreadyRunning> {
        let permit = self.coordinator.try_start()?;
        let job = self.clone();
        Ok(tokio::spawn(async move {
            job.run_with(permit).await;
        }))
    }

    pub async fn run_now(&self) -> Result<BatchReport, AlreadyRunning> {
        let permit = self.coordinator.try_start()?;
        Ok(self.run_with(permit).await)
    }

    async fn run_with(&self, permit: RunPermit) -> BatchReport {
        let mut items = collect_items(
            &self.providers,
            self.cfg.items_per_source,
            self.cfg.max_item_age_hours,
        )
        .await;
        if let Some(translator) = &self.translator {
            let bound = self.cfg.max_items_per_run.min(items.len());
            translator.localize(&mut items[..bound]).await;
        }
        let report = self
            .coordinator
            .run_with_permit(permit, items, self.cfg.max_items_per_run)
            .await;

        match self
            .coordinator
            .store()
            .cleanup_older_than(self.cfg.retention_days)
            .await
        {
            Ok(0) => {}
            Ok(n) => info!(target: "store", removed = n, "old items cleaned up"),
            Err(e) => warn!(target: "store", error = %e, "cleanup failed"),
        }
        report
    }
}

/// Spawns the two periodic tasks: the slow full-analysis run and the fast feed-refresh hook.
pub fn spawn_scheduler(job: AnalysisJob) -> (JoinHandle<()>, JoinHandle<()>) {
    let analysis_period = job.cfg.analysis_period;
    let first_run = Instant::now() + job.cfg.first_run_delay;
    let refresh_period = job.cfg.feed_refresh_period;

    let analysis = tokio::spawn(async move {
        let mut ticker = interval_at(first_run, analysis_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match job.run_now().await {
                Ok(report) => info!(
                    target: "ingest",
                    processed = report.processed.len(),
                    analyzed = report.analyzed,
                    reused = report.reused,
                    "scheduled analysis finished"
                ),
                Err(AlreadyRunning) => {
                    info!(target: "ingest", "scheduled analysis skipped: run in flight")
                }
            }
        }
    });

    let refresh = tokio::spawn(async move {
        let mut ticker = interval(refresh_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; the hook starts one period in.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!(target: "ingest", "feed refresh tick");
        }
    });

    (analysis, refresh)
}
