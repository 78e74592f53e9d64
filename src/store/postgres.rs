// src/store/postgres.rs
//! Postgres-backed store. One pool checkout per call; no transaction spans a batch.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;

use super::Store;
use crate::analyze::{Analysis, Urgency};
use crate::digest::Digest;
use crate::item::{AnalyzedItem, Item, Translation, DEFAULT_IMPORTANCE};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS articles (
        article_hash     TEXT PRIMARY KEY,
        title            TEXT NOT NULL,
        source           TEXT NOT NULL,
        category         TEXT NOT NULL DEFAULT '',
        description      TEXT NOT NULL DEFAULT '',
        link             TEXT NOT NULL DEFAULT '',
        pub_date         TIMESTAMPTZ NOT NULL,
        created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
        importance_score INTEGER NOT NULL DEFAULT 5,
        urgency          TEXT NOT NULL DEFAULT 'monitoring',
        executive_summary TEXT,
        localized_title  TEXT,
        ai_analysis      JSONB,
        translated_title TEXT,
        translated_description TEXT
    )",
    "ALTER TABLE articles ADD COLUMN IF NOT EXISTS translated_title TEXT",
    "ALTER TABLE articles ADD COLUMN IF NOT EXISTS translated_description TEXT",
    "CREATE INDEX IF NOT EXISTS articles_rank_idx ON articles (importance_score DESC, pub_date DESC)",
    "CREATE TABLE IF NOT EXISTS digests (
        id         BIGSERIAL PRIMARY KEY,
        content    TEXT NOT NULL,
        item_count INTEGER NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS processing_status (
        id              BIGSERIAL PRIMARY KEY,
        status          TEXT NOT NULL,
        started_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
        completed_at    TIMESTAMPTZ,
        items_processed INTEGER NOT NULL DEFAULT 0
    )",
];

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct ArticleRow {
    title: String,
    source: String,
    category: String,
    description: String,
    link: String,
    pub_date: DateTime<Utc>,
    importance_score: i32,
    urgency: String,
    ai_analysis: Option<Json<Analysis>>,
    translated_title: Option<String>,
    translated_description: Option<String>,
}

impl ArticleRow {
    fn into_analyzed(self) -> AnalyzedItem {
        let mut item = Item::new(
            self.title,
            self.source,
            self.category,
            self.description,
            self.pub_date,
            self.link,
        );
        if let Some(title) = self.translated_title {
            let description = self
                .translated_description
                .unwrap_or_else(|| item.body.clone());
            item.translation = Some(Translation { title, description });
        }
        let importance = u8::try_from(self.importance_score.clamp(1, 10)).unwrap_or(DEFAULT_IMPORTANCE);
        AnalyzedItem {
            item,
            analysis: self.ai_analysis.map(|j| j.0),
            importance_score: importance,
            urgency: Urgency::parse_or_default(&self.urgency),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DigestRow {
    content: String,
    item_count: i32,
    created_at: DateTime<Utc>,
}

impl PgStore {
    /// Connects and creates the tables if they do not exist.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .context("connecting to Postgres")?;
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&pool)
                .await
                .context("creating schema")?;
        }
        info!(target: "store", "postgres store ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PgStore {
    fn is_durable(&self) -> bool {
        true
    }

    async fn save(&self, item: &Item, analysis: Option<&Analysis>) -> Result<()> {
        let (importance, urgency) = analysis
            .map(|a| (a.importance_score, a.urgency))
            .unwrap_or((DEFAULT_IMPORTANCE, Urgency::Monitoring));
        // Analysis columns are only replaced when a new analysis arrives.
        sqlx::query(
            "INSERT INTO articles (article_hash, title, source, category, description, link, pub_date,
                                   importance_score, urgency, executive_summary, localized_title, ai_analysis,
                                   translated_title, translated_description)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             ON CONFLICT (article_hash)
             DO UPDATE SET
                 importance_score = CASE WHEN EXCLUDED.ai_analysis IS NULL
                     THEN articles.importance_score ELSE EXCLUDED.importance_score END,
                 urgency = CASE WHEN EXCLUDED.ai_analysis IS NULL
                     THEN articles.urgency ELSE EXCLUDED.urgency END,
                 executive_summary = CASE WHEN EXCLUDED.ai_analysis IS NULL
                     THEN articles.executive_summary ELSE EXCLUDED.executive_summary END,
                 localized_title = CASE WHEN EXCLUDED.ai_analysis IS NULL
                     THEN articles.localized_title ELSE EXCLUDED.localized_title END,
                 ai_analysis = COALESCE(EXCLUDED.ai_analysis, articles.ai_analysis),
                 translated_title = COALESCE(EXCLUDED.translated_title, articles.translated_title),
                 translated_description = COALESCE(EXCLUDED.translated_description, articles.translated_description),
                 description = EXCLUDED.description",
        )
        .bind(item.id())
        .bind(&item.title)
        .bind(&item.source)
        .bind(&item.category)
        .bind(&item.body)
        .bind(&item.link)
        .bind(item.published_at)
        .bind(i32::from(importance))
        .bind(urgency.as_str())
        .bind(analysis.map(|a| a.executive_summary.clone()))
        .bind(analysis.filter(|a| a.has_localized_title()).map(|a| a.localized_title.clone()))
        .bind(analysis.map(Json))
        .bind(item.translation.as_ref().map(|t| t.title.as_str()))
        .bind(item.translation.as_ref().map(|t| t.description.as_str()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("saving article {}", item.id()))?;
        Ok(())
    }

    async fn latest(&self, n: usize) -> Result<Vec<AnalyzedItem>> {
        let rows = sqlx::query_as::<_, ArticleRow>(
            "SELECT title, source, category, description, link, pub_date,
                    importance_score, urgency, ai_analysis,
                    translated_title, translated_description
             FROM articles
             ORDER BY importance_score DESC,
                      CASE urgency
                          WHEN 'immediate' THEN 0
                          WHEN 'within-24h' THEN 1
                          WHEN 'within-1-week' THEN 2
                          ELSE 3
                      END,
                      pub_date DESC
             LIMIT $1",
        )
        .bind(i64::try_from(n).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("loading latest articles")?;
        Ok(rows.into_iter().map(ArticleRow::into_analyzed).collect())
    }

    async fn save_digest(&self, text: &str, item_count: usize) -> Result<()> {
        sqlx::query("INSERT INTO digests (content, item_count) VALUES ($1, $2)")
            .bind(text)
            .bind(i32::try_from(item_count).unwrap_or(i32::MAX))
            .execute(&self.pool)
            .await
            .context("saving digest")?;
        Ok(())
    }

    async fn latest_digest(&self) -> Result<Option<Digest>> {
        let row = sqlx::query_as::<_, DigestRow>(
            "SELECT content, item_count, created_at FROM digests ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("loading latest digest")?;
        Ok(row.map(|r| Digest {
            text: r.content,
            item_count: usize::try_from(r.item_count).unwrap_or(0),
            created_at: r.created_at,
        }))
    }

    async fn start_processing(&self) -> Result<()> {
        sqlx::query("INSERT INTO processing_status (status) VALUES ('processing')")
            .execute(&self.pool)
            .await
            .context("recording run start")?;
        Ok(())
    }

    async fn complete_processing(&self, processed: usize) -> Result<()> {
        sqlx::query(
            "UPDATE processing_status
             SET status = 'completed', completed_at = now(), items_processed = $1
             WHERE id = (SELECT id FROM processing_status
                         WHERE status = 'processing'
                         ORDER BY started_at DESC LIMIT 1)",
        )
        .bind(i32::try_from(processed).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await
        .context("recording run completion")?;
        Ok(())
    }

    async fn cleanup_older_than(&self, days: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM articles WHERE created_at < now() - make_interval(days => $1)",
        )
        .bind(i32::try_from(days).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await
        .context("cleaning up old articles")?;
        Ok(result.rows_affected())
    }
}
