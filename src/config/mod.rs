// src/config/mod.rs
//! Runtime configuration: env-driven pipeline knobs plus the file-based AI and feed configs.

pub mod ai;
pub mod feeds;

use std::env;
use std::str::FromStr;
use std::time::Duration;

pub use ai::{AiConfig, ProviderConfig};
pub use feeds::FeedSource;

/// Batch/scheduler knobs read from the environment. Unset or unparsable values use defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Upper bound of items analyzed per run; the rest pass through untouched.
    pub max_items_per_run: usize,
    /// Publish a progress snapshot after every K-th item.
    pub publish_interval: usize,
    pub snapshot_size: usize,
    pub final_snapshot_size: usize,
    pub digest_top_n: usize,
    /// Rows read from the store to build the analysis lookup.
    pub cache_lookup_limit: usize,
    pub analysis_period: Duration,
    pub feed_refresh_period: Duration,
    pub first_run_delay: Duration,
    pub items_per_source: usize,
    pub max_item_age_hours: i64,
    pub retention_days: i64,
    pub database_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_items_per_run: 60,
            publish_interval: 3,
            snapshot_size: 10,
            final_snapshot_size: 30,
            digest_top_n: 10,
            cache_lookup_limit: 1000,
            analysis_period: Duration::from_secs(6 * 60 * 60),
            feed_refresh_period: Duration::from_secs(15 * 60),
            first_run_delay: Duration::from_secs(2),
            items_per_source: 3,
            max_item_age_hours: 48,
            retention_days: 30,
            database_url: None,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let mut cfg = Self {
            max_items_per_run: env_or("MAX_ITEMS_PER_RUN", d.max_items_per_run),
            publish_interval: env_or("PUBLISH_INTERVAL", d.publish_interval).max(1),
            snapshot_size: env_or("SNAPSHOT_SIZE", d.snapshot_size),
            final_snapshot_size: env_or("FINAL_SNAPSHOT_SIZE", d.final_snapshot_size),
            digest_top_n: env_or("DIGEST_TOP_N", d.digest_top_n),
            cache_lookup_limit: env_or("CACHE_LOOKUP_LIMIT", d.cache_lookup_limit),
            analysis_period: Duration::from_secs(env_or(
                "ANALYSIS_PERIOD_SECS",
                d.analysis_period.as_secs(),
            )),
            feed_refresh_period: Duration::from_secs(env_or(
                "FEED_REFRESH_PERIOD_SECS",
                d.feed_refresh_period.as_secs(),
            )),
            first_run_delay: Duration::from_secs(env_or(
                "FIRST_RUN_DELAY_SECS",
                d.first_run_delay.as_secs(),
            )),
            items_per_source: env_or("ITEMS_PER_SOURCE", d.items_per_source),
            max_item_age_hours: env_or("MAX_ITEM_AGE_HOURS", d.max_item_age_hours),
            retention_days: env_or("RETENTION_DAYS", d.retention_days),
            database_url: env::var("DATABASE_URL")
                .ok()
                .filter(|u| !u.trim().is_empty())
                .map(|u| normalize_database_url(&u)),
        };

        if env::var("TEST_MODE").is_ok_and(|v| v == "1") {
            cfg.max_items_per_run = cfg.max_items_per_run.min(3);
            cfg.publish_interval = 1;
        }
        cfg
    }
}

/// Hosted Postgres often hands out `postgres://`; accept both schemes.
pub fn normalize_database_url(url: &str) -> String {
    let url = url.trim();
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{rest}"),
        None => url.to_string(),
    }
}
