// tests/batch_e2e.rs
//
// End-to-end batch runs with in-process fakes for the model services and the store.
//
// Covered:
// - cached identities skip the service, misses are analyzed and persisted
// - status is `processing` for the whole run and `completed` afterwards
// - progress snapshots appear every K items, truncated to the display size,
//   including when the item at a publish index is a repeat
// - a failed re-analysis keeps the analysis already in the store
// - all-unparsable answers + failed digest still complete with neutral defaults
// - a store that fails every call does not abort the run

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};

use econ_newsletter::ai_adapter::{CompletionService, LlmError, LlmFuture};
use econ_newsletter::analyze::{Analysis, ItemAnalyzer, Urgency};
use econ_newsletter::batch::{BatchCoordinator, BatchSettings};
use econ_newsletter::digest::{Digest, DigestSynthesizer, NO_DIGEST};
use econ_newsletter::item::{AnalyzedItem, Item};
use econ_newsletter::store::{MemoryStore, NullStore, Store};
use econ_newsletter::surface::{ReadSurface, Status};

/// Answers with an importance taken from the title ("... [7]") and records what the
/// surface looked like while the call was in flight.
struct ScoringService {
    surface: ReadSurface,
    calls: AtomicUsize,
    seen_status: Mutex<Vec<Status>>,
    seen_items: Mutex<Vec<usize>>,
}

impl ScoringService {
    fn new(surface: ReadSurface) -> Arc<Self> {
        Arc::new(Self {
            surface,
            calls: AtomicUsize::new(0),
            seen_status: Mutex::new(Vec::new()),
            seen_items: Mutex::new(Vec::new()),
        })
    }
}

fn score_from_prompt(prompt: &str) -> u8 {
    prompt
        .lines()
        .find_map(|l| l.strip_prefix("Title: "))
        .and_then(|t| t.rsplit_once('[').map(|(_, rest)| rest.trim_end_matches(']')))
        .and_then(|n| n.parse().ok())
        .unwrap_or(5)
}

impl CompletionService for ScoringService {
    fn complete<'a>(&'a self, _system: Option<&'a str>, prompt: &'a str) -> LlmFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let snap = self.surface.snapshot();
        self.seen_status.lock().unwrap().push(snap.status);
        self.seen_items.lock().unwrap().push(snap.items.len());
        let score = score_from_prompt(prompt);
        Box::pin(async move {
            Ok(format!(
                r#"Here is the analysis:
```json
{{"hungarian_title": "Cím {score}", "executive_summary": "Summary {score}", "importance_score": {score}, "urgency": "24h",}}
```"#
            ))
        })
    }
    fn provider_name(&self) -> &'static str {
        "scoring"
    }
}

/// Fixed answer for every call.
struct Canned {
    answer: Result<String, LlmError>,
    calls: AtomicUsize,
}

impl Canned {
    fn ok(s: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(s.to_string()),
            calls: AtomicUsize::new(0),
        })
    }
    fn err(e: LlmError) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(e),
            calls: AtomicUsize::new(0),
        })
    }
}

impl CompletionService for Canned {
    fn complete<'a>(&'a self, _system: Option<&'a str>, _prompt: &'a str) -> LlmFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.answer.clone();
        Box::pin(async move { answer })
    }
    fn provider_name(&self) -> &'static str {
        "canned"
    }
}

/// Every operation fails.
struct BrokenStore;

#[async_trait]
impl Store for BrokenStore {
    fn is_durable(&self) -> bool {
        true
    }
    async fn save(&self, _item: &Item, _analysis: Option<&Analysis>) -> Result<()> {
        Err(anyhow!("connection reset"))
    }
    async fn latest(&self, _n: usize) -> Result<Vec<AnalyzedItem>> {
        Err(anyhow!("connection reset"))
    }
    async fn save_digest(&self, _text: &str, _item_count: usize) -> Result<()> {
        Err(anyhow!("connection reset"))
    }
    async fn latest_digest(&self) -> Result<Option<Digest>> {
        Err(anyhow!("connection reset"))
    }
    async fn start_processing(&self) -> Result<()> {
        Err(anyhow!("connection reset"))
    }
    async fn complete_processing(&self, _processed: usize) -> Result<()> {
        Err(anyhow!("connection reset"))
    }
    async fn cleanup_older_than(&self, _days: i64) -> Result<u64> {
        Err(anyhow!("connection reset"))
    }
}

fn item(title: &str, minutes_ago: i64) -> Item {
    Item::new(
        title,
        "Wire",
        "Markets",
        "Body text for the story.",
        Utc::now() - Duration::minutes(minutes_ago),
        "https://wire.example/story",
    )
}

fn stored(score: u8, summary: &str) -> Analysis {
    let mut a = Analysis::from_summary(summary);
    a.importance_score = score;
    a.urgency = Urgency::Immediate;
    a
}

#[tokio::test]
async fn cached_items_skip_the_service_and_status_tracks_the_run() {
    let surface = ReadSurface::new();
    let analysis_svc = ScoringService::new(surface.clone());
    let digest_svc = Canned::ok("<h2>Daily review</h2>");
    let store = Arc::new(MemoryStore::new());

    let items = vec![
        item("Rates decision [6]", 1),
        item("Cached budget story [3]", 2),
        item("Payrolls miss [8]", 3),
        item("Cached tariff story [2]", 4),
        item("Oil slides [4]", 5),
    ];
    store.save(&items[1], Some(&stored(9, "from store"))).await.unwrap();
    store.save(&items[3], Some(&stored(7, "also from store"))).await.unwrap();

    let coordinator = BatchCoordinator::new(
        ItemAnalyzer::new(analysis_svc.clone(), "Hungarian"),
        DigestSynthesizer::new(digest_svc.clone(), "Hungarian", 10),
        store.clone(),
        surface.clone(),
        BatchSettings::default(),
    );

    assert_eq!(surface.status(), Status::Idle);
    let report = coordinator.run_batch(items, 10).await.expect("not refused");

    assert_eq!(analysis_svc.calls.load(Ordering::SeqCst), 3, "only the 3 misses call out");
    assert_eq!(digest_svc.calls.load(Ordering::SeqCst), 1);
    assert_eq!((report.analyzed, report.reused, report.defaulted), (3, 2, 0));
    assert!(analysis_svc
        .seen_status
        .lock()
        .unwrap()
        .iter()
        .all(|s| *s == Status::Processing));

    // Cached analyses are reused verbatim, not re-scored from the title.
    let scores: Vec<u8> = report.processed.iter().map(|i| i.importance_score).collect();
    assert_eq!(scores, vec![9, 8, 7, 6, 4]);
    let cached = &report.processed[0];
    assert_eq!(cached.analysis.as_ref().unwrap().executive_summary, "from store");
    assert_eq!(cached.urgency, Urgency::Immediate);
    assert_eq!(report.processed[1].urgency, Urgency::Within24h);

    assert_eq!(store.len().await, 5);
    let digest = store.latest_digest().await.unwrap().expect("digest persisted");
    assert_eq!(digest.item_count, 5);

    let snap = surface.snapshot();
    assert_eq!(snap.status, Status::Completed);
    assert_eq!(snap.run_count, 1);
    assert_eq!(snap.digest, "<h2>Daily review</h2>");
    assert_eq!(snap.items.len(), 5);
    assert_eq!(snap.items[1].title, "Cím 8", "localized title is displayed");
    assert_eq!(snap.items[1].original_title, "Payrolls miss [8]");

    let runs = store.runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].processed, 5);
}

#[tokio::test]
async fn progress_snapshots_follow_the_publish_interval() {
    let surface = ReadSurface::new();
    let analysis_svc = ScoringService::new(surface.clone());
    let settings = BatchSettings {
        publish_interval: 2,
        snapshot_size: 2,
        ..BatchSettings::default()
    };
    let coordinator = BatchCoordinator::new(
        ItemAnalyzer::new(analysis_svc.clone(), "English"),
        DigestSynthesizer::new(Canned::ok("digest"), "English", 10),
        Arc::new(NullStore),
        surface.clone(),
        settings,
    );

    let items = (0..5).map(|i| item(&format!("Story {i} [{}]", i + 1), i)).collect();
    coordinator.run_batch(items, 5).await.unwrap();

    // Published after indexes 0, 2 and 4; each call sees the last published snapshot.
    assert_eq!(*analysis_svc.seen_items.lock().unwrap(), vec![0, 1, 1, 2, 2]);
}

#[tokio::test]
async fn repeat_on_a_publish_index_still_publishes() {
    let surface = ReadSurface::new();
    let analysis_svc = ScoringService::new(surface.clone());
    let settings = BatchSettings {
        publish_interval: 2,
        snapshot_size: 10,
        ..BatchSettings::default()
    };
    let coordinator = BatchCoordinator::new(
        ItemAnalyzer::new(analysis_svc.clone(), "English"),
        DigestSynthesizer::new(Canned::ok("digest"), "English", 10),
        Arc::new(NullStore),
        surface.clone(),
        settings,
    );

    let alpha = item("Alpha [3]", 1);
    let items = vec![alpha.clone(), item("Beta [4]", 2), alpha, item("Gamma [5]", 3)];
    let report = coordinator.run_batch(items, 4).await.unwrap();

    assert_eq!(report.duplicates, 1);
    // Index 2 is the repeat; its snapshot still goes out before Gamma is analyzed.
    assert_eq!(*analysis_svc.seen_items.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn failed_reanalysis_keeps_the_stored_analysis() {
    let store = Arc::new(MemoryStore::new());
    let high = item("High", 1);
    let low = item("Low", 2);
    store.save(&high, Some(&stored(9, "high summary"))).await.unwrap();
    store.save(&low, Some(&stored(2, "low summary"))).await.unwrap();

    let analysis_svc = Canned::err(LlmError::Timeout);
    let settings = BatchSettings {
        cache_lookup_limit: 1,
        ..BatchSettings::default()
    };
    let coordinator = BatchCoordinator::new(
        ItemAnalyzer::new(analysis_svc.clone(), "English"),
        DigestSynthesizer::new(Canned::ok("digest"), "English", 10),
        store.clone(),
        ReadSurface::new(),
        settings,
    );

    let report = coordinator.run_batch(vec![low.clone()], 1).await.unwrap();
    // Only "High" fits in the lookup, so "Low" goes back to the service and fails.
    assert_eq!(analysis_svc.calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.defaulted, 1);

    let row = store.get(low.id()).await.expect("row kept");
    assert_eq!(row.importance_score, 2);
    assert_eq!(row.urgency, Urgency::Immediate);
    assert_eq!(row.analysis.expect("analysis kept").executive_summary, "low summary");
}

#[tokio::test]
async fn unusable_answers_and_failed_digest_still_complete() {
    let surface = ReadSurface::new();
    let analysis_svc = Canned::ok("I'm sorry, I cannot analyze this article.");
    let digest_svc = Canned::err(LlmError::Quota);
    let store = Arc::new(MemoryStore::new());
    let coordinator = BatchCoordinator::new(
        ItemAnalyzer::new(analysis_svc.clone(), "English"),
        DigestSynthesizer::new(digest_svc.clone(), "English", 10),
        store.clone(),
        surface.clone(),
        BatchSettings::default(),
    );

    let items = vec![item("One", 1), item("Two", 2), item("Three", 3)];
    let report = coordinator.run_batch(items, 3).await.unwrap();

    assert_eq!(report.defaulted, 3);
    assert!(report.digest.is_none());
    assert!(report
        .processed
        .iter()
        .all(|i| i.importance_score == 5 && i.urgency == Urgency::Monitoring && !i.has_analysis()));
    // No analyzed items means no digest call at all.
    assert_eq!(digest_svc.calls.load(Ordering::SeqCst), 0);
    // Presence in the store reflects "attempted", not "succeeded".
    assert_eq!(store.len().await, 3);

    let snap = surface.snapshot();
    assert_eq!(snap.digest, NO_DIGEST);
    assert_eq!(snap.status, Status::Completed);
    assert_eq!(snap.items.len(), 3);
}

#[tokio::test]
async fn digest_service_failure_yields_marker() {
    let surface = ReadSurface::new();
    let coordinator = BatchCoordinator::new(
        ItemAnalyzer::new(ScoringService::new(surface.clone()), "English"),
        DigestSynthesizer::new(Canned::err(LlmError::Timeout), "English", 10),
        Arc::new(NullStore),
        surface.clone(),
        BatchSettings::default(),
    );
    let report = coordinator.run_batch(vec![item("Rates [7]", 1)], 1).await.unwrap();
    assert!(report.digest.is_none());
    assert_eq!(report.processed[0].importance_score, 7);
    assert_eq!(surface.snapshot().digest, NO_DIGEST);
}

#[tokio::test]
async fn failing_store_does_not_abort_the_run() {
    let surface = ReadSurface::new();
    let analysis_svc = ScoringService::new(surface.clone());
    let coordinator = BatchCoordinator::new(
        ItemAnalyzer::new(analysis_svc.clone(), "English"),
        DigestSynthesizer::new(Canned::ok("digest text"), "English", 10),
        Arc::new(BrokenStore),
        surface.clone(),
        BatchSettings::default(),
    );

    let items = vec![item("Low [2]", 1), item("High [9]", 2)];
    let report = coordinator.run_batch(items, 2).await.unwrap();
    assert_eq!(analysis_svc.calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.digest.as_deref(), Some("digest text"));

    let snap = surface.snapshot();
    assert_eq!(snap.status, Status::Completed);
    let titles: Vec<_> = snap.items.iter().map(|i| i.original_title.as_str()).collect();
    assert_eq!(titles, vec!["High [9]", "Low [2]"], "falls back to the in-memory set");
}
