//! In-memory stand-ins for sources, storage and publishing used by the
//! pipeline and scheduler tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::publish::Publisher;
use crate::source::{Article, ArticleRef, SourceAdapter};
use crate::storage::{DedupRecord, DedupStore};
use crate::{Error, Result};

#[derive(Clone, Copy)]
enum ListingMode {
    Ok,
    Unreachable,
    Unparsable,
}

pub struct StubSource {
    id: String,
    urls: Vec<String>,
    listing: ListingMode,
    failing: Vec<String>,
    ages: HashMap<String, i64>,
    fetch_delay: Duration,
    listings: AtomicU32,
}

impl StubSource {
    pub fn new(id: &str, urls: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
            listing: ListingMode::Ok,
            failing: Vec::new(),
            ages: HashMap::new(),
            fetch_delay: Duration::ZERO,
            listings: AtomicU32::new(0),
        }
    }

    pub fn failing_listing(mut self) -> Self {
        self.listing = ListingMode::Unreachable;
        self
    }

    pub fn unparsable_listing(mut self) -> Self {
        self.listing = ListingMode::Unparsable;
        self
    }

    pub fn failing_article(mut self, url: &str) -> Self {
        self.failing.push(url.to_string());
        self
    }

    pub fn published_days_ago(mut self, url: &str, days: i64) -> Self {
        self.ages.insert(url.to_string(), days);
        self
    }

    /// Each article fetch sleeps this long (tokio clock)
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Number of times the listing was requested
    pub fn listings(&self) -> u32 {
        self.listings.load(Ordering::SeqCst)
    }

    pub fn article(&self, article_ref: &ArticleRef) -> Article {
        Article {
            article_ref: article_ref.clone(),
            title: format!("Story at {}", article_ref.url),
            body: "Body text.".into(),
            published_at: self
                .ages
                .get(&article_ref.url)
                .map(|days| Utc::now() - chrono::Duration::days(*days)),
            fetched_at: Utc::now(),
        }
    }
}

#[async_trait]
impl SourceAdapter for StubSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    async fn list_article_refs(&self) -> Result<Vec<ArticleRef>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        match self.listing {
            ListingMode::Ok => Ok(self
                .urls
                .iter()
                .map(|u| ArticleRef::new(self.id.as_str(), u.as_str()))
                .collect()),
            ListingMode::Unreachable => Err(Error::fetch("https://stub.test", "HTTP 404 Not Found", true)),
            ListingMode::Unparsable => Err(Error::Parse("link selector matched no elements".into())),
        }
    }

    async fn fetch_article(&self, article_ref: &ArticleRef) -> Result<Article> {
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        if self.failing.contains(&article_ref.url) {
            return Err(Error::fetch(article_ref.url.as_str(), "connection reset", false));
        }
        Ok(self.article(article_ref))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<ArticleRef, DedupRecord>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Storage(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn is_processed(&self, article_ref: &ArticleRef) -> Result<bool> {
        self.check()?;
        Ok(self.records.lock().unwrap().contains_key(article_ref))
    }

    async fn mark_processed(&self, record: &DedupRecord) -> Result<bool> {
        self.check()?;
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.article_ref) {
            return Ok(false);
        }
        records.insert(record.article_ref.clone(), record.clone());
        Ok(true)
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<String>>,
    fail_remaining: AtomicU32,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` messages with a permanent error
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, text: &str) -> Result<()> {
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::publish("Bad Request: chat not found", false));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
