// src/ingest/mod.rs
pub mod rss;
pub mod scheduler;
pub mod types;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::FeedSource;
use crate::ingest::rss::{feed_http_client, RssProvider};
use crate::ingest::types::{FeedEntry, FeedProvider};
use crate::item::Item;

/// Characters kept from a normalized title/body.
const MAX_TEXT_CHARS: usize = 1500;
/// Characters of description shown in the live source listing.
const LISTING_DESCRIPTION_CHARS: usize = 150;

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("valid tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Items accepted from feeds.");
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Normalize feed text: decode entities, strip tags, straighten quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    let out = RE_TAGS.replace_all(&out, " ");

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    let out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    let out = RE_WS.replace_all(&out, " ");
    let out = out.trim();

    // 5) Length cap
    if out.chars().count() > MAX_TEXT_CHARS {
        out.chars().take(MAX_TEXT_CHARS).collect()
    } else {
        out.to_string()
    }
}

/// Turns the first `per_source` entries of one source into items, dropping those
/// older than `max_age`. Entries without a date count as published `now`.
pub fn entries_to_items(
    source: &FeedSource,
    entries: Vec<FeedEntry>,
    per_source: usize,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Vec<Item> {
    entries
        .into_iter()
        .take(per_source)
        .filter_map(|e| {
            let title = normalize_text(&e.title);
            if title.is_empty() {
                return None;
            }
            let published = e.published_at.unwrap_or(now);
            if now - published > max_age {
                return None;
            }
            Some(Item::new(
                title,
                source.name.clone(),
                source.category.clone(),
                normalize_text(&e.description),
                published,
                e.link,
            ))
        })
        .collect()
}

/// Polls every provider once. A failing provider is logged and skipped.
pub async fn collect_items(
    providers: &[Box<dyn FeedProvider>],
    per_source: usize,
    max_age_hours: i64,
) -> Vec<Item> {
    ensure_metrics_described();

    let now = Utc::now();
    let max_age = Duration::hours(max_age_hours);
    let mut out = Vec::new();
    for p in providers {
        match p.fetch_latest().await {
            Ok(entries) => {
                let items = entries_to_items(p.source(), entries, per_source, max_age, now);
                counter!("ingest_items_total").increment(items.len() as u64);
                out.extend(items);
            }
            Err(e) => {
                warn!(target: "ingest", error = ?e, provider = %p.source().name, "provider error");
                counter!("ingest_provider_errors_total").increment(1);
            }
        }
    }
    info!(target: "ingest", sources = providers.len(), items = out.len(), "feeds collected");
    out
}

/// HTTP providers for the configured sources.
pub fn build_providers(feeds: &[FeedSource]) -> anyhow::Result<Vec<Box<dyn FeedProvider>>> {
    let client = feed_http_client()?;
    Ok(feeds
        .iter()
        .map(|f| Box::new(RssProvider::http(f.clone(), client.clone())) as Box<dyn FeedProvider>)
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct ListedEntry {
    pub title: String,
    pub link: String,
    pub pub_date: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceListing {
    pub name: String,
    pub url: String,
    pub category: String,
    pub articles: Vec<ListedEntry>,
}

/// Live view of each source with its latest `per_source` entries (no age filter).
/// A failing source is listed with no entries.
pub async fn list_sources(providers: &[Box<dyn FeedProvider>], per_source: usize) -> Vec<SourceListing> {
    let now = Utc::now();
    let mut out = Vec::with_capacity(providers.len());
    for p in providers {
        let src = p.source();
        let articles = match p.fetch_latest().await {
            Ok(entries) => entries
                .into_iter()
                .take(per_source)
                .map(|e| {
                    let desc = normalize_text(&e.description);
                    let description = if desc.chars().count() > LISTING_DESCRIPTION_CHARS {
                        let cut: String = desc.chars().take(LISTING_DESCRIPTION_CHARS).collect();
                        format!("{cut}...")
                    } else {
                        desc
                    };
                    ListedEntry {
                        title: normalize_text(&e.title),
                        link: e.link,
                        pub_date: e.published_at.unwrap_or(now),
                        description,
                    }
                })
                .collect(),
            Err(e) => {
                warn!(target: "ingest", error = ?e, provider = %src.name, "source listing failed");
                counter!("ingest_provider_errors_total").increment(1);
                Vec::new()
            }
        };
        out.push(SourceListing {
            name: src.name.clone(),
            url: src.url.clone(),
            category: src.category.clone(),
            articles,
        });
    }
    out
}
