// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::FeedSource;

/// One raw feed entry, before normalization and identity assignment.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub description: String,
    pub link: String,
    /// `None` when the feed gave no parsable date.
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait FeedProvider: Send + Sync {
    /// Entries in feed order (newest first for well-behaved feeds).
    async fn fetch_latest(&self) -> Result<Vec<FeedEntry>>;
    fn source(&self) -> &FeedSource;
}
