//! # Batch coordinator
//! Drives one analysis run over a candidate list:
//!
//! 1. claim the run guard on the read surface (refuse if a run is in flight)
//! 2. build the analysis lookup once from the store
//! 3. per item, sequentially: reuse a stored analysis or call the analyzer, then persist
//! 4. every K-th item, publish a ranked, truncated progress snapshot
//! 5. rank everything, synthesize the digest, persist it, publish the final snapshot
//!
//! No single item, store call or digest failure aborts the run. Items beyond `max_items`
//! are passed through untouched (neutral defaults, not persisted).

use std::collections::HashSet;

use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::analyze::{AnalysisLookup, GateDecision, ItemAnalyzer};
use crate::config::PipelineConfig;
use crate::digest::{DigestSynthesizer, NO_DIGEST};
use crate::item::{AnalyzedItem, DisplayItem, Item};
use crate::metrics::describe_pipeline_metrics;
use crate::ranking;
use crate::store::DynStore;
use crate::surface::{ReadSurface, RunPermit};

/// Returned when a run is requested while another is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("a batch run is already in progress")]
pub struct AlreadyRunning;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Publish after item index `i` when `i % publish_interval == 0`.
    pub publish_interval: usize,
    pub snapshot_size: usize,
    pub final_snapshot_size: usize,
    pub cache_lookup_limit: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for BatchSettings {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            publish_interval: cfg.publish_interval.max(1),
            snapshot_size: cfg.snapshot_size,
            final_snapshot_size: cfg.final_snapshot_size,
            cache_lookup_limit: cfg.cache_lookup_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Ranked processed items followed by the untouched pass-through items.
    pub processed: Vec<AnalyzedItem>,
    pub digest: Option<String>,
    /// Items that went through the analyzer.
    pub analyzed: usize,
    /// Items whose stored analysis was reused.
    pub reused: usize,
    /// Analyzer calls that produced no usable record.
    pub defaulted: usize,
    /// Repeats of an identity already seen in this run.
    pub duplicates: usize,
}

#[derive(Debug, Default)]
struct Tally {
    analyzed: usize,
    reused: usize,
    defaulted: usize,
    duplicates: usize,
}

pub struct BatchCoordinator {
    analyzer: ItemAnalyzer,
    digest: DigestSynthesizer,
    store: DynStore,
    surface: ReadSurface,
    settings: BatchSettings,
}

fn display(items: &[AnalyzedItem]) -> Vec<DisplayItem> {
    items.iter().map(AnalyzedItem::display).collect()
}

impl BatchCoordinator {
    pub fn new(
        analyzer: ItemAnalyzer,
        digest: DigestSynthesizer,
        store: DynStore,
        surface: ReadSurface,
        settings: BatchSettings,
    ) -> Self {
        Self {
            analyzer,
            digest,
            store,
            surface,
            settings,
        }
    }

    pub fn surface(&self) -> &ReadSurface {
        &self.surface
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    /// Claims the run guard without doing any work yet.
    pub fn try_start(&self) -> Result<RunPermit, AlreadyRunning> {
        match self.surface.try_begin() {
            Some(permit) => Ok(permit),
            None => {
                counter!("batch_refused_total").increment(1);
                warn!(target: "batch", "run refused: already in progress");
                Err(AlreadyRunning)
            }
        }
    }

    pub async fn run_batch(
        &self,
        candidates: Vec<Item>,
        max_items: usize,
    ) -> Result<BatchReport, AlreadyRunning> {
        let permit = self.try_start()?;
        Ok(self.run_with_permit(permit, candidates, max_items).await)
    }

    /// Runs to completion under an already-claimed permit.
    pub async fn run_with_permit(
        &self,
        permit: RunPermit,
        mut candidates: Vec<Item>,
        max_items: usize,
    ) -> BatchReport {
        describe_pipeline_metrics();
        let bound = max_items.min(candidates.len());
        let passthrough = candidates.split_off(bound);
        info!(target: "batch", candidates = bound, passthrough = passthrough.len(), "run started");

        if let Err(e) = self.store.start_processing().await {
            store_error("start_processing", &e);
        }

        let lookup = match self.store.latest(self.settings.cache_lookup_limit).await {
            Ok(rows) => AnalysisLookup::from_stored(rows),
            Err(e) => {
                store_error("latest", &e);
                AnalysisLookup::default()
            }
        };
        debug!(target: "batch", cached = lookup.len(), "analysis lookup built");

        let publish_interval = self.settings.publish_interval.max(1);
        let mut working: Vec<AnalyzedItem> = Vec::with_capacity(bound);
        let mut seen: HashSet<String> = HashSet::with_capacity(bound);
        let mut tally = Tally::default();

        for (i, item) in candidates.into_iter().enumerate() {
            if seen.insert(item.id().to_string()) {
                let entry = self.process_one(item, &lookup, &mut tally).await;
                working.push(entry);
            } else {
                tally.duplicates += 1;
                debug!(target: "batch", id = item.id(), "repeat identity collapsed");
            }

            if i % publish_interval == 0 {
                let snapshot = ranking::ranked_top(&working, self.settings.snapshot_size);
                permit.publish_progress(display(&snapshot));
                debug!(target: "batch", done = working.len(), "progress published");
            }
        }

        ranking::rank_in_place(&mut working);

        let digest = self.digest.synthesize(&working).await;
        if let Some(d) = &digest {
            if let Err(e) = self.store.save_digest(&d.text, d.item_count).await {
                store_error("save_digest", &e);
            }
        }

        if let Err(e) = self.store.complete_processing(working.len()).await {
            store_error("complete_processing", &e);
        }

        let final_items = self.final_snapshot(&working).await;
        let digest_text = digest.map(|d| d.text);
        permit.finish(
            display(&final_items),
            digest_text.clone().unwrap_or_else(|| NO_DIGEST.to_string()),
        );

        counter!("batch_runs_total").increment(1);
        gauge!("batch_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        info!(
            target: "batch",
            processed = working.len(),
            analyzed = tally.analyzed,
            reused = tally.reused,
            defaulted = tally.defaulted,
            duplicates = tally.duplicates,
            digest = digest_text.is_some(),
            "run completed"
        );

        let mut processed = working;
        processed.extend(passthrough.into_iter().map(AnalyzedItem::pending));
        BatchReport {
            processed,
            digest: digest_text,
            analyzed: tally.analyzed,
            reused: tally.reused,
            defaulted: tally.defaulted,
            duplicates: tally.duplicates,
        }
    }

    /// Reuses a stored analysis or calls the analyzer and persists the outcome.
    async fn process_one(
        &self,
        item: Item,
        lookup: &AnalysisLookup,
        tally: &mut Tally,
    ) -> AnalyzedItem {
        match lookup.decide(item.id()) {
            GateDecision::Reuse(stored) => {
                tally.reused += 1;
                counter!("analysis_cache_hits_total").increment(1);
                debug!(target: "batch", id = item.id(), "stored analysis reused");
                AnalyzedItem::with_analysis(item, stored)
            }
            GateDecision::Analyze => {
                tally.analyzed += 1;
                let analysis = self.analyzer.analyze(&item).await;
                if analysis.is_none() {
                    tally.defaulted += 1;
                }
                if let Err(e) = self.store.save(&item, analysis.as_ref()).await {
                    store_error("save", &e);
                }
                AnalyzedItem::from_outcome(item, analysis)
            }
        }
    }

    /// Durable rows when a backend is present and answers, else the in-memory set.
    async fn final_snapshot(&self, working: &[AnalyzedItem]) -> Vec<AnalyzedItem> {
        let size = self.settings.final_snapshot_size;
        if self.store.is_durable() {
            match self.store.latest(size).await {
                Ok(mut rows) if !rows.is_empty() => {
                    ranking::rank_in_place(&mut rows);
                    return rows;
                }
                Ok(_) => {}
                Err(e) => store_error("latest", &e),
            }
        }
        ranking::ranked_top(working, size)
    }
}

fn store_error(op: &'static str, e: &anyhow::Error) {
    counter!("store_errors_total").increment(1);
    warn!(target: "store", op, error = %e, "store operation failed; continuing in memory");
}
