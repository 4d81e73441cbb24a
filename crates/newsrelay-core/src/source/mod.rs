mod extract;
mod fetcher;
mod html_source;
mod models;
mod normalize;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::Result;

pub use extract::{date_from_url, parse_date, ExtractedArticle, Extractor};
pub use fetcher::HttpFetcher;
pub use html_source::HtmlSource;
pub use models::{Article, ArticleRef};
pub use normalize::UrlNormalizer;

/// A news site the pipeline can pull articles from.
///
/// `list_article_refs` returns refs in the site's listing order with URLs
/// already normalized. A listing that parses but yields nothing usable
/// should surface as [`crate::Error::Parse`] so callers can tell a layout
/// change apart from an unreachable site.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier used as the dedup namespace
    fn id(&self) -> &str;

    /// Display name shown in published messages
    fn name(&self) -> &str;

    async fn list_article_refs(&self) -> Result<Vec<ArticleRef>>;

    async fn fetch_article(&self, article_ref: &ArticleRef) -> Result<Article>;
}

/// Build one [`HtmlSource`] per configured source, sharing a single fetcher
pub fn build_sources(config: &AppConfig) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let fetcher = Arc::new(HttpFetcher::new(&config.fetch, config.retry.policy())?);
    let normalizer = Arc::new(UrlNormalizer::new(&config.normalize));

    config
        .sources
        .iter()
        .map(|source| {
            let adapter = HtmlSource::new(source.clone(), fetcher.clone(), normalizer.clone())?;
            Ok(Arc::new(adapter) as Arc<dyn SourceAdapter>)
        })
        .collect()
}
