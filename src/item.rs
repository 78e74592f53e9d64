//! # News items
//! An `Item` is one ingested news unit. Its identity is derived from title + source so that
//! the same story seen twice (across feed polls, or twice in one poll) collapses to one id.
//!
//! `AnalyzedItem` pairs an item with its optional `Analysis` plus the *effective*
//! importance/urgency used for ranking. Items whose analysis could not be recovered still
//! carry the neutral defaults, so downstream code never has to handle a missing score.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analyze::{Analysis, Urgency};

/// Neutral importance used whenever the model gives none (or nothing usable came back).
pub const DEFAULT_IMPORTANCE: u8 = 5;

/// Stable identity: first 6 bytes of SHA-256 over `"{title}-{source}"`, lowercase hex (12 chars).
pub fn item_id(title: &str, source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"-");
    hasher.update(source.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Feed title and description rendered in the output language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    id: String,
    pub title: String,
    pub source: String,
    pub category: String,
    /// Article description / body as delivered by the feed (normalized text).
    pub body: String,
    pub published_at: DateTime<Utc>,
    pub link: String,
    /// Set by the translation step; `title` and `body` keep the feed text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<Translation>,
}

impl Item {
    pub fn new(
        title: impl Into<String>,
        source: impl Into<String>,
        category: impl Into<String>,
        body: impl Into<String>,
        published_at: DateTime<Utc>,
        link: impl Into<String>,
    ) -> Self {
        let title = title.into();
        let source = source.into();
        Self {
            id: item_id(&title, &source),
            title,
            source,
            category: category.into(),
            body: body.into(),
            published_at,
            link: link.into(),
            translation: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Translated description if present, else the feed description.
    pub fn localized_body(&self) -> &str {
        self.translation
            .as_ref()
            .map_or(self.body.as_str(), |t| t.description.as_str())
    }
}

/// An item together with the outcome of its analysis cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedItem {
    pub item: Item,
    /// `None` when the item was never analyzed or nothing usable came back.
    pub analysis: Option<Analysis>,
    pub importance_score: u8,
    pub urgency: Urgency,
}

impl AnalyzedItem {
    /// Item with no analysis and neutral defaults.
    pub fn pending(item: Item) -> Self {
        Self {
            item,
            analysis: None,
            importance_score: DEFAULT_IMPORTANCE,
            urgency: Urgency::Monitoring,
        }
    }

    pub fn with_analysis(item: Item, analysis: Analysis) -> Self {
        Self {
            item,
            importance_score: analysis.importance_score,
            urgency: analysis.urgency,
            analysis: Some(analysis),
        }
    }

    /// Builds from an optional analysis, falling back to the neutral defaults.
    pub fn from_outcome(item: Item, analysis: Option<Analysis>) -> Self {
        match analysis {
            Some(a) => Self::with_analysis(item, a),
            None => Self::pending(item),
        }
    }

    pub fn id(&self) -> &str {
        self.item.id()
    }

    pub fn has_analysis(&self) -> bool {
        self.analysis.is_some()
    }

    /// Projection published on the shared read surface.
    pub fn display(&self) -> DisplayItem {
        let analysis = self.analysis.as_ref();
        let title = analysis
            .filter(|a| a.has_localized_title())
            .map(|a| a.localized_title.clone())
            .or_else(|| self.item.translation.as_ref().map(|t| t.title.clone()))
            .unwrap_or_else(|| self.item.title.clone());
        DisplayItem {
            id: self.id().to_string(),
            title,
            original_title: self.item.title.clone(),
            source: self.item.source.clone(),
            category: self.item.category.clone(),
            published_at: self.item.published_at,
            link: self.item.link.clone(),
            importance_score: self.importance_score,
            urgency: self.urgency,
            executive_summary: analysis
                .map(|a| a.executive_summary.clone())
                .unwrap_or_default(),
            description: self.item.localized_body().to_string(),
            original_description: self.item.body.clone(),
            full_analysis: self.analysis.clone(),
        }
    }
}

/// Read-only row shown to dashboard / API readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayItem {
    pub id: String,
    /// Localized title from the analysis, else the translated title, else the feed title.
    pub title: String,
    pub original_title: String,
    pub source: String,
    pub category: String,
    pub published_at: DateTime<Utc>,
    pub link: String,
    pub importance_score: u8,
    pub urgency: Urgency,
    pub executive_summary: String,
    pub description: String,
    pub original_description: String,
    pub full_analysis: Option<Analysis>,
}
