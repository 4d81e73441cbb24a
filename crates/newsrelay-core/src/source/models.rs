use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a discovered article: the source it came from plus its
/// normalized URL. Equal refs are the same article for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleRef {
    pub source_id: String,
    /// Normalized absolute URL (see [`super::UrlNormalizer`])
    pub url: String,
}

impl ArticleRef {
    pub fn new(source_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            url: url.into(),
        }
    }
}

/// A fetched and parsed article page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub article_ref: ArticleRef,
    pub title: String,
    /// Full extracted text; truncation happens when formatting
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

impl Article {
    /// Whether the article's known publication date is older than `max_age`.
    /// Articles without a date are never considered stale.
    pub fn is_older_than(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.published_at
            .map(|published| now - published > max_age)
            .unwrap_or(false)
    }
}
