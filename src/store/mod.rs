// src/store/mod.rs
//! Durable store interface.
//!
//! Every method is one short logical operation. `NullStore` stands in when no backend is
//! configured: writes are no-ops, reads are empty, and `is_durable()` tells the batch
//! coordinator to treat its in-memory working set as the only source of truth.

pub mod postgres;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::analyze::Analysis;
use crate::digest::Digest;
use crate::item::{AnalyzedItem, Item};
use crate::ranking;

pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    /// `false` for the zero-backend store.
    fn is_durable(&self) -> bool;

    /// Upserts by item identity; a new analysis overwrites the old one. With `None` a new
    /// row gets the neutral importance/urgency defaults and an existing row keeps its
    /// analysis.
    async fn save(&self, item: &Item, analysis: Option<&Analysis>) -> Result<()>;

    /// Up to `n` rows in ranking order (importance, then urgency), newest published first
    /// among equals.
    async fn latest(&self, n: usize) -> Result<Vec<AnalyzedItem>>;

    async fn save_digest(&self, text: &str, item_count: usize) -> Result<()>;

    /// Most recent digest, if any.
    async fn latest_digest(&self) -> Result<Option<Digest>>;

    async fn start_processing(&self) -> Result<()>;

    async fn complete_processing(&self, processed: usize) -> Result<()>;

    /// Deletes items saved more than `days` ago. Returns the number removed.
    async fn cleanup_older_than(&self, days: i64) -> Result<u64>;
}

pub type DynStore = Arc<dyn Store>;

/// Zero-backend store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait]
impl Store for NullStore {
    fn is_durable(&self) -> bool {
        false
    }
    async fn save(&self, _item: &Item, _analysis: Option<&Analysis>) -> Result<()> {
        Ok(())
    }
    async fn latest(&self, _n: usize) -> Result<Vec<AnalyzedItem>> {
        Ok(Vec::new())
    }
    async fn save_digest(&self, _text: &str, _item_count: usize) -> Result<()> {
        Ok(())
    }
    async fn latest_digest(&self) -> Result<Option<Digest>> {
        Ok(None)
    }
    async fn start_processing(&self) -> Result<()> {
        Ok(())
    }
    async fn complete_processing(&self, _processed: usize) -> Result<()> {
        Ok(())
    }
    async fn cleanup_older_than(&self, _days: i64) -> Result<u64> {
        Ok(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Processing,
    Completed,
}

#[derive(Debug, Clone)]
pub struct ProcessingRecord {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processed: usize,
}

#[derive(Debug, Default)]
struct MemoryInner {
    rows: HashMap<String, (AnalyzedItem, DateTime<Utc>)>,
    digests: Vec<Digest>,
    runs: Vec<ProcessingRecord>,
}

/// Process-local durable-looking store. Used by tests and local runs without Postgres.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row as if it had been saved `age` ago.
    pub async fn insert_aged(&self, row: AnalyzedItem, age: Duration) {
        let mut g = self.inner.lock().await;
        g.rows
            .insert(row.id().to_string(), (row, Utc::now() - age));
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.rows.len()
    }

    pub async fn get(&self, id: &str) -> Option<AnalyzedItem> {
        self.inner.lock().await.rows.get(id).map(|(r, _)| r.clone())
    }

    pub async fn runs(&self) -> Vec<ProcessingRecord> {
        self.inner.lock().await.runs.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn is_durable(&self) -> bool {
        true
    }

    async fn save(&self, item: &Item, analysis: Option<&Analysis>) -> Result<()> {
        let mut g = self.inner.lock().await;
        let entry = match g.rows.remove(item.id()) {
            Some((prev, saved_at)) => {
                let mut next = item.clone();
                if next.translation.is_none() {
                    next.translation = prev.item.translation.clone();
                }
                let row = match analysis {
                    Some(a) => AnalyzedItem::with_analysis(next, a.clone()),
                    None => AnalyzedItem { item: next, ..prev },
                };
                (row, saved_at)
            }
            None => (
                AnalyzedItem::from_outcome(item.clone(), analysis.cloned()),
                Utc::now(),
            ),
        };
        g.rows.insert(item.id().to_string(), entry);
        Ok(())
    }

    async fn latest(&self, n: usize) -> Result<Vec<AnalyzedItem>> {
        let g = self.inner.lock().await;
        let mut rows: Vec<AnalyzedItem> = g.rows.values().map(|(r, _)| r.clone()).collect();
        rows.sort_by(|a, b| {
            ranking::compare(a, b).then_with(|| b.item.published_at.cmp(&a.item.published_at))
        });
        rows.truncate(n);
        Ok(rows)
    }

    async fn save_digest(&self, text: &str, item_count: usize) -> Result<()> {
        let mut g = self.inner.lock().await;
        g.digests.push(Digest {
            text: text.to_string(),
            item_count,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn latest_digest(&self) -> Result<Option<Digest>> {
        Ok(self.inner.lock().await.digests.last().cloned())
    }

    async fn start_processing(&self) -> Result<()> {
        self.inner.lock().await.runs.push(ProcessingRecord {
            status: RunStatus::Processing,
            started_at: Utc::now(),
            completed_at: None,
            processed: 0,
        });
        Ok(())
    }

    async fn complete_processing(&self, processed: usize) -> Result<()> {
        let mut g = self.inner.lock().await;
        if let Some(run) = g
            .runs
            .iter_mut()
            .rev()
            .find(|r| r.status == RunStatus::Processing)
        {
            run.status = RunStatus::Completed;
            run.completed_at = Some(Utc::now());
            run.processed = processed;
        }
        Ok(())
    }

    async fn cleanup_older_than(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut g = self.inner.lock().await;
        let before = g.rows.len();
        g.rows.retain(|_, (_, saved_at)| *saved_at >= cutoff);
        Ok((before - g.rows.len()) as u64)
    }
}
