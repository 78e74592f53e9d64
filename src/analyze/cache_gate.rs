// src/analyze/cache_gate.rs
//! Reuse-vs-analyze decision keyed by item identity.
//!
//! The lookup is built once per batch run from the store's latest rows, so the whole run
//! costs a single storage read. No eviction, no TTL: an identity that has a stored
//! analysis is never re-analyzed.

use std::collections::HashMap;

use super::Analysis;
use crate::item::AnalyzedItem;

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Reuse(Analysis),
    Analyze,
}

#[derive(Debug, Default, Clone)]
pub struct AnalysisLookup {
    by_id: HashMap<String, Analysis>,
}

impl AnalysisLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes stored rows that carry an analysis. The first row per identity wins.
    pub fn from_stored<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = AnalyzedItem>,
    {
        let mut by_id = HashMap::new();
        for row in rows {
            let AnalyzedItem { item, analysis, .. } = row;
            if let Some(a) = analysis {
                by_id.entry(item.id().to_string()).or_insert(a);
            }
        }
        Self { by_id }
    }

    pub fn decide(&self, id: &str) -> GateDecision {
        match self.by_id.get(id) {
            Some(a) => GateDecision::Reuse(a.clone()),
            None => GateDecision::Analyze,
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
