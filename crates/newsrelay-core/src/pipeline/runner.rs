use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::claims::ClaimSet;
use super::report::{CycleReport, SourceReport};
use crate::message::Formatter;
use crate::publish::Publisher;
use crate::source::{ArticleRef, SourceAdapter};
use crate::storage::{DedupRecord, DedupStore};
use crate::{Error, Result};

enum ArticleOutcome {
    Published,
    Duplicate,
    Stale,
}

/// State shared by all source tasks of one cycle
struct Cycle {
    store: Arc<dyn DedupStore>,
    publisher: Arc<dyn Publisher>,
    formatter: Formatter,
    max_article_age: Option<chrono::Duration>,
    claims: ClaimSet,
    /// Set on the first storage failure; other sources stop at their next article
    abort: AtomicBool,
}

/// Runs discover → dedup → fetch → format → publish → mark across all sources
pub struct PipelineRunner {
    sources: Vec<Arc<dyn SourceAdapter>>,
    store: Arc<dyn DedupStore>,
    publisher: Arc<dyn Publisher>,
    formatter: Formatter,
    max_article_age: Option<chrono::Duration>,
}

impl PipelineRunner {
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        store: Arc<dyn DedupStore>,
        publisher: Arc<dyn Publisher>,
        formatter: Formatter,
    ) -> Self {
        Self {
            sources,
            store,
            publisher,
            formatter,
            max_article_age: None,
        }
    }

    /// Skip articles whose known publication date is older than `days`
    pub fn with_max_article_age(mut self, days: Option<u32>) -> Self {
        self.max_article_age = days.map(|d| chrono::Duration::days(i64::from(d)));
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Run one full cycle. Only a storage failure makes this return `Err`;
    /// fetch, parse and publish failures are counted in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(sources = self.sources.len(), "Pipeline cycle started");

        let cycle = Arc::new(Cycle {
            store: self.store.clone(),
            publisher: self.publisher.clone(),
            formatter: self.formatter.clone(),
            max_article_age: self.max_article_age,
            claims: ClaimSet::new(),
            abort: AtomicBool::new(false),
        });

        let mut tasks = JoinSet::new();
        for (index, source) in self.sources.iter().enumerate() {
            let cycle = cycle.clone();
            let source = source.clone();
            tasks.spawn(async move {
                let (report, fatal) = cycle.process_source(source.as_ref()).await;
                (index, report, fatal)
            });
        }

        let mut reports: Vec<Option<SourceReport>> = vec![None; self.sources.len()];
        let mut storage_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report, fatal)) => {
                    reports[index] = Some(report);
                    if storage_error.is_none() {
                        storage_error = fatal;
                    }
                }
                Err(e) => error!(error = %e, "Source task panicked"),
            }
        }

        if let Some(e) = storage_error {
            error!(error = %e, "Pipeline cycle aborted by storage failure");
            return Err(e);
        }

        let sources = reports
            .into_iter()
            .zip(&self.sources)
            .map(|(report, source)| {
                report.unwrap_or_else(|| SourceReport {
                    listing_failed: true,
                    ..SourceReport::new(source.id(), source.name())
                })
            })
            .collect();

        let report = CycleReport {
            started_at,
            duration: start.elapsed(),
            sources,
        };
        info!(
            published = report.published(),
            duplicate = report.skipped_duplicate(),
            stale = report.skipped_stale(),
            failed = report.failed(),
            unreachable = report.failed_sources(),
            "Pipeline cycle finished"
        );
        Ok(report)
    }
}

impl Cycle {
    /// Process one source sequentially. Returns the report and, if the
    /// cycle has to stop, the storage error that caused it.
    async fn process_source(&self, source: &dyn SourceAdapter) -> (SourceReport, Option<Error>) {
        let mut report = SourceReport::new(source.id(), source.name());

        let refs = match source.list_article_refs().await {
            Ok(refs) => refs,
            Err(Error::Parse(message)) => {
                warn!(source = source.id(), error = %message, "Listing yielded no articles");
                Vec::new()
            }
            Err(e) => {
                error!(source = source.id(), kind = e.kind(), error = %e, "Listing failed, skipping source");
                report.listing_failed = true;
                return (report, None);
            }
        };
        report.discovered = refs.len() as u32;

        for article_ref in refs {
            if self.abort.load(Ordering::SeqCst) {
                debug!(source = source.id(), "Cycle aborted, stopping source");
                break;
            }

            match self.process_article(source, &article_ref).await {
                Ok(ArticleOutcome::Published) => report.published += 1,
                Ok(ArticleOutcome::Duplicate) => report.skipped_duplicate += 1,
                Ok(ArticleOutcome::Stale) => report.skipped_stale += 1,
                Err(e @ Error::Storage(_)) => {
                    self.abort.store(true, Ordering::SeqCst);
                    return (report, Some(e));
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        source = source.id(),
                        url = %article_ref.url,
                        kind = e.kind(),
                        error = %e,
                        "Article not published, will retry next cycle"
                    );
                }
            }
        }

        (report, None)
    }

    async fn process_article(
        &self,
        source: &dyn SourceAdapter,
        article_ref: &ArticleRef,
    ) -> Result<ArticleOutcome> {
        let Some(_claim) = self.claims.claim(article_ref) else {
            return Ok(ArticleOutcome::Duplicate);
        };

        if self.store.is_processed(article_ref).await? {
            debug!(source = source.id(), url = %article_ref.url, "Already published");
            return Ok(ArticleOutcome::Duplicate);
        }

        let article = source.fetch_article(article_ref).await?;

        if let Some(max_age) = self.max_article_age {
            if article.is_older_than(max_age, Utc::now()) {
                debug!(source = source.id(), url = %article_ref.url, "Skipping stale article");
                return Ok(ArticleOutcome::Stale);
            }
        }

        let text = self.formatter.format(&article, source.name());
        self.publisher.publish(&text).await?;
        self.store
            .mark_processed(&DedupRecord::new(&article, source.name()))
            .await?;

        info!(source = source.id(), title = %article.title, "Published article");
        Ok(ArticleOutcome::Published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, SqliteDedupStore};
    use crate::testing::{MemoryStore, RecordingPublisher, StubSource};

    fn runner(
        sources: Vec<Arc<StubSource>>,
        store: Arc<dyn DedupStore>,
        publisher: Arc<RecordingPublisher>,
    ) -> PipelineRunner {
        let sources = sources
            .into_iter()
            .map(|s| s as Arc<dyn SourceAdapter>)
            .collect();
        PipelineRunner::new(sources, store, publisher, Formatter::default())
    }

    #[tokio::test]
    async fn test_only_new_article_is_published() {
        let store = Arc::new(SqliteDedupStore::new(Database::new_in_memory().await.unwrap()));
        let source = Arc::new(StubSource::new("tx", &["https://tx.test/a", "https://tx.test/b"]));
        let publisher = Arc::new(RecordingPublisher::new());

        let stored = source.article(&ArticleRef::new("tx", "https://tx.test/a"));
        store.mark_processed(&DedupRecord::new(&stored, "TX")).await.unwrap();

        let report = runner(vec![source], store.clone(), publisher.clone())
            .run_cycle()
            .await
            .unwrap();

        let sent = publisher.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("https://tx.test/b"));
        assert_eq!(store.count(None).await.unwrap(), 2);
        assert_eq!(report.published(), 1);
        assert_eq!(report.skipped_duplicate(), 1);
    }

    #[tokio::test]
    async fn test_second_cycle_publishes_nothing() {
        let store = Arc::new(SqliteDedupStore::new(Database::new_in_memory().await.unwrap()));
        let source = Arc::new(StubSource::new("tx", &["https://tx.test/a", "https://tx.test/b"]));
        let publisher = Arc::new(RecordingPublisher::new());
        let runner = runner(vec![source], store, publisher.clone());

        runner.run_cycle().await.unwrap();
        assert_eq!(publisher.sent().len(), 2);

        let report = runner.run_cycle().await.unwrap();
        assert_eq!(publisher.sent().len(), 2);
        assert_eq!(report.skipped_duplicate(), 2);
        assert_eq!(report.published(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_is_retried_next_cycle() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(StubSource::new("tx", &["https://tx.test/a"]));
        let publisher = Arc::new(RecordingPublisher::new());
        publisher.fail_next(1);
        let runner = runner(vec![source], store.clone(), publisher.clone());

        let first = runner.run_cycle().await.unwrap();
        assert_eq!(first.failed(), 1);
        assert!(!store
            .is_processed(&ArticleRef::new("tx", "https://tx.test/a"))
            .await
            .unwrap());

        let second = runner.run_cycle().await.unwrap();
        assert_eq!(second.published(), 1);
        assert_eq!(publisher.sent().len(), 1);
        assert!(store
            .is_processed(&ArticleRef::new("tx", "https://tx.test/a"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_listing_failure_does_not_block_other_sources() {
        let store = Arc::new(MemoryStore::new());
        let broken = Arc::new(StubSource::new("down", &["https://down.test/a"]).failing_listing());
        let healthy = Arc::new(StubSource::new("up", &["https://up.test/a"]));
        let publisher = Arc::new(RecordingPublisher::new());

        let report = runner(vec![broken, healthy], store, publisher.clone())
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(publisher.sent().len(), 1);
        assert!(report.sources[0].listing_failed);
        assert_eq!(report.sources[0].source_id, "down");
        assert_eq!(report.sources[1].published, 1);
    }

    #[tokio::test]
    async fn test_parse_error_listing_counts_as_empty() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(StubSource::new("tx", &["https://tx.test/a"]).unparsable_listing());
        let publisher = Arc::new(RecordingPublisher::new());

        let report = runner(vec![source], store, publisher.clone())
            .run_cycle()
            .await
            .unwrap();

        assert!(!report.sources[0].listing_failed);
        assert_eq!(report.discovered(), 0);
        assert!(publisher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_only_that_article() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(
            StubSource::new("tx", &["https://tx.test/a", "https://tx.test/b"])
                .failing_article("https://tx.test/a"),
        );
        let publisher = Arc::new(RecordingPublisher::new());

        let report = runner(vec![source], store.clone(), publisher.clone())
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.published(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_cycle() {
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true);
        let source = Arc::new(StubSource::new("tx", &["https://tx.test/a"]));
        let publisher = Arc::new(RecordingPublisher::new());

        let err = runner(vec![source], store, publisher.clone())
            .run_cycle()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Storage(_)));
        assert!(publisher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_same_ref_from_two_sources_is_published_once() {
        let store = Arc::new(MemoryStore::new());
        let first = Arc::new(StubSource::new("tx", &["https://tx.test/a"]));
        let second = Arc::new(StubSource::new("tx", &["https://tx.test/a"]));
        let publisher = Arc::new(RecordingPublisher::new());

        let report = runner(vec![first, second], store, publisher.clone())
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(publisher.sent().len(), 1);
        assert_eq!(report.published(), 1);
        assert_eq!(report.skipped_duplicate(), 1);
    }

    #[tokio::test]
    async fn test_stale_articles_are_skipped_unmarked() {
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(
            StubSource::new("tx", &["https://tx.test/old", "https://tx.test/new"])
                .published_days_ago("https://tx.test/old", 30)
                .published_days_ago("https://tx.test/new", 1),
        );
        let publisher = Arc::new(RecordingPublisher::new());

        let report = runner(vec![source], store.clone(), publisher.clone())
            .with_max_article_age(Some(7))
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(report.skipped_stale(), 1);
        assert_eq!(report.published(), 1);
        assert!(!store
            .is_processed(&ArticleRef::new("tx", "https://tx.test/old"))
            .await
            .unwrap());
    }
}
