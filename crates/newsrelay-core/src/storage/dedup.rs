use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::retry::with_retry;
use super::Database;
use crate::source::{Article, ArticleRef};
use crate::Result;

/// Proof that an article was published. Written once, never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupRecord {
    pub article_ref: ArticleRef,
    pub title: String,
    pub source_name: String,
    pub processed_at: DateTime<Utc>,
}

impl DedupRecord {
    pub fn new(article: &Article, source_name: &str) -> Self {
        Self {
            article_ref: article.article_ref.clone(),
            title: article.title.clone(),
            source_name: source_name.to_string(),
            processed_at: Utc::now(),
        }
    }
}

/// Persistent set of already-published articles
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn is_processed(&self, article_ref: &ArticleRef) -> Result<bool>;

    /// Record a published article. Returns `false` when the ref was
    /// already present, in which case nothing changes.
    async fn mark_processed(&self, record: &DedupRecord) -> Result<bool>;
}

#[derive(FromRow)]
struct RecordRow {
    source_id: String,
    url: String,
    title: String,
    source_name: String,
    processed_at: DateTime<Utc>,
}

impl From<RecordRow> for DedupRecord {
    fn from(row: RecordRow) -> Self {
        DedupRecord {
            article_ref: ArticleRef::new(row.source_id, row.url),
            title: row.title,
            source_name: row.source_name,
            processed_at: row.processed_at,
        }
    }
}

/// SQLite-backed [`DedupStore`] over the `processed_articles` table
#[derive(Clone)]
pub struct SqliteDedupStore {
    db: Database,
}

impl SqliteDedupStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Number of records, optionally for one source only
    pub async fn count(&self, source_id: Option<&str>) -> Result<i64> {
        let (count,): (i64,) = with_retry("dedup.count", || {
            sqlx::query_as(
                "SELECT COUNT(*) FROM processed_articles WHERE (?1 IS NULL OR source_id = ?1)",
            )
            .bind(source_id)
            .fetch_one(self.db.pool())
        })
        .await?;
        Ok(count)
    }

    /// Record count per source id, ordered by id
    pub async fn count_by_source(&self) -> Result<Vec<(String, i64)>> {
        with_retry("dedup.count_by_source", || {
            sqlx::query_as(
                r#"
                SELECT source_id, COUNT(*) FROM processed_articles
                GROUP BY source_id
                ORDER BY source_id
                "#,
            )
            .fetch_all(self.db.pool())
        })
        .await
    }

    /// Most recently published records, newest first
    pub async fn recent(&self, limit: i64) -> Result<Vec<DedupRecord>> {
        let rows: Vec<RecordRow> = with_retry("dedup.recent", || {
            sqlx::query_as(
                r#"
                SELECT source_id, url, title, source_name, processed_at
                FROM processed_articles
                ORDER BY processed_at DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(self.db.pool())
        })
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl DedupStore for SqliteDedupStore {
    async fn is_processed(&self, article_ref: &ArticleRef) -> Result<bool> {
        let row: Option<(i64,)> = with_retry("dedup.is_processed", || {
            sqlx::query_as("SELECT 1 FROM processed_articles WHERE source_id = ? AND url = ?")
                .bind(&article_ref.source_id)
                .bind(&article_ref.url)
                .fetch_optional(self.db.pool())
        })
        .await?;
        Ok(row.is_some())
    }

    async fn mark_processed(&self, record: &DedupRecord) -> Result<bool> {
        let result = with_retry("dedup.mark_processed", || {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO processed_articles
                (source_id, url, title, source_name, processed_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.article_ref.source_id)
            .bind(&record.article_ref.url)
            .bind(&record.title)
            .bind(&record.source_name)
            .bind(record.processed_at)
            .execute(self.db.pool())
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
