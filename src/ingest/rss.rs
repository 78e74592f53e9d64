// src/ingest/rss.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::config::FeedSource;
use crate::ingest::types::{FeedEntry, FeedProvider};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}
#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// RFC 2822 (`Tue, 10 Sep 2024 14:30:00 +0000`, also `GMT` zones) to UTC.
pub fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), 0))
        .or_else(|| {
            DateTime::parse_from_rfc2822(ts)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

/// Parses an RSS 2.0 document into entries (raw text, not yet normalized).
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let out = rss
        .channel
        .item
        .into_iter()
        .map(|it| FeedEntry {
            title: it.title.unwrap_or_default(),
            description: it.description.unwrap_or_default(),
            link: it.link.unwrap_or_default().trim().to_string(),
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
        })
        .collect();

    histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(out)
}

pub struct RssProvider {
    source: FeedSource,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http(reqwest::Client),
}

impl RssProvider {
    pub fn from_fixture(source: FeedSource, xml: &str) -> Self {
        Self {
            source,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn http(source: FeedSource, client: reqwest::Client) -> Self {
        Self {
            source,
            mode: Mode::Http(client),
        }
    }
}

/// Shared client for feed polling.
pub fn feed_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("econ-newsletter/0.1 (rss reader)")
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(10))
        .build()
        .context("building feed HTTP client")
}

#[async_trait]
impl FeedProvider for RssProvider {
    async fn fetch_latest(&self) -> Result<Vec<FeedEntry>> {
        match &self.mode {
            Mode::Fixture(s) => parse_feed(s),
            Mode::Http(client) => {
                let resp = client
                    .get(&self.source.url)
                    .send()
                    .await
                    .with_context(|| format!("GET {}", self.source.url))?
                    .error_for_status()
                    .with_context(|| format!("status from {}", self.source.url))?;
                let body = resp.text().await.context("reading feed body")?;
                parse_feed(&body)
            }
        }
    }

    fn source(&self) -> &FeedSource {
        &self.source
    }
}

/// Named HTML entities are not valid XML; map the common ones before parsing.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
