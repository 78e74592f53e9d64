// src/config/feeds.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "FEEDS_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/feeds.toml";

/// One RSS source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Deserialize)]
struct FeedsFile {
    #[serde(default)]
    sources: Vec<FeedSource>,
}

/// Load sources from an explicit TOML file.
pub fn load_feeds_from(path: &Path) -> Result<Vec<FeedSource>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feeds from {}", path.display()))?;
    parse_feeds(&content)
}

/// Load sources using env var + fallbacks:
/// 1) $FEEDS_CONFIG_PATH (must exist)
/// 2) config/feeds.toml
/// 3) built-in seed list
pub fn load_feeds_default() -> Result<Vec<FeedSource>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            anyhow::bail!("{ENV_PATH} points to non-existent path {}", pb.display());
        }
        return load_feeds_from(&pb);
    }
    let default = PathBuf::from(DEFAULT_PATH);
    if default.exists() {
        return load_feeds_from(&default);
    }
    Ok(seed_feeds())
}

pub fn parse_feeds(s: &str) -> Result<Vec<FeedSource>> {
    let file: FeedsFile = toml::from_str(s).context("parsing feeds TOML")?;
    Ok(clean(file.sources))
}

/// Trims fields, drops entries without name/url, dedups by url (first wins).
fn clean(items: Vec<FeedSource>) -> Vec<FeedSource> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter_map(|f| {
            let name = f.name.trim().to_string();
            let url = f.url.trim().to_string();
            if name.is_empty() || url.is_empty() || !seen.insert(url.clone()) {
                return None;
            }
            Some(FeedSource {
                name,
                url,
                category: f.category.trim().to_string(),
            })
        })
        .collect()
}

pub fn seed_feeds() -> Vec<FeedSource> {
    let seed = [
        ("Bloomberg Markets", "https://feeds.bloomberg.com/markets/news.rss", "Piacok"),
        ("Bloomberg Politics", "https://feeds.bloomberg.com/politics/news.rss", "Gazdaságpolitika"),
        ("Financial Times", "https://www.ft.com/rss/home", "Általános gazdaság"),
        ("The Economist - Finance", "https://www.economist.com/finance-and-economics/rss.xml", "Elemzések"),
        ("MarketWatch", "https://feeds.content.dowjones.io/public/rss/mw_topstories", "Tőzsde"),
        ("CNBC", "https://www.cnbc.com/id/100003114/device/rss/rss.html", "Tőzsde"),
        ("BBC Business", "http://feeds.bbci.co.uk/news/business/rss.xml", "Globális gazdaság"),
        ("Federal Reserve FRED", "https://fredblog.stlouisfed.org/feed/", "Fed elemzések"),
        ("Congressional Budget Office", "https://www.cbo.gov/publications/all/rss.xml", "Költségvetés"),
        ("Calculated Risk", "http://feeds.feedburner.com/calculatedrisk", "Makrogazdaság"),
    ];
    seed.iter()
        .map(|(name, url, category)| FeedSource {
            name: name.to_string(),
            url: url.to_string(),
            category: category.to_string(),
        })
        .collect()
}
