use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use url::Url;

use super::extract::{date_from_url, Extractor};
use super::fetcher::HttpFetcher;
use super::models::{Article, ArticleRef};
use super::normalize::UrlNormalizer;
use super::SourceAdapter;
use crate::config::SourceConfig;
use crate::{Error, Result};

/// Generic scraping adapter driven entirely by a [`SourceConfig`]
pub struct HtmlSource {
    config: SourceConfig,
    listing_url: Url,
    base_url: Url,
    article_pattern: Option<Regex>,
    extractor: Extractor,
    fetcher: Arc<HttpFetcher>,
    normalizer: Arc<UrlNormalizer>,
}

fn bare_host(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
}

impl HtmlSource {
    pub fn new(
        config: SourceConfig,
        fetcher: Arc<HttpFetcher>,
        normalizer: Arc<UrlNormalizer>,
    ) -> Result<Self> {
        let listing_url = Url::parse(&config.listing_url)?;
        let base_url = Url::parse(&config.base_url)?;
        let article_pattern = config
            .article_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::Config(format!("source '{}' article_pattern: {}", config.id, e)))?;
        let extractor = Extractor::new(&config)?;

        Ok(Self {
            config,
            listing_url,
            base_url,
            article_pattern,
            extractor,
            fetcher,
            normalizer,
        })
    }

    /// Resolve a raw `href` and keep it only if it is an on-site article link
    fn accept_link(&self, href: &str) -> Option<Url> {
        let url = self.base_url.join(href).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        if bare_host(&url) != bare_host(&self.base_url) {
            return None;
        }
        if let Some(ref pattern) = self.article_pattern {
            if !pattern.is_match(url.path()) {
                return None;
            }
        }
        Some(url)
    }

    /// Turn listing hrefs into unique, capped refs in discovery order
    fn collect_refs(&self, hrefs: &[String]) -> Vec<ArticleRef> {
        let mut seen = HashSet::new();
        hrefs
            .iter()
            .filter_map(|href| self.accept_link(href))
            .map(|url| self.normalizer.normalize(&url))
            .filter(|normalized| seen.insert(normalized.clone()))
            .take(self.config.max_articles)
            .map(|normalized| ArticleRef::new(self.config.id.as_str(), normalized))
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for HtmlSource {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn list_article_refs(&self) -> Result<Vec<ArticleRef>> {
        let html = self
            .fetcher
            .fetch_page(&self.listing_url, self.config.request_delay())
            .await?;

        let hrefs = self.extractor.extract_links(&html).map_err(|e| match e {
            Error::Parse(msg) => Error::Parse(format!("{} ({})", msg, self.listing_url)),
            other => other,
        })?;
        let refs = self.collect_refs(&hrefs);

        tracing::info!(
            source = %self.config.id,
            links = hrefs.len(),
            articles = refs.len(),
            "Indexed listing page"
        );
        Ok(refs)
    }

    async fn fetch_article(&self, article_ref: &ArticleRef) -> Result<Article> {
        let url = Url::parse(&article_ref.url)?;
        let html = self
            .fetcher
            .fetch_page(&url, self.config.request_delay())
            .await?;

        let extracted = self.extractor.extract_article(&html).map_err(|e| match e {
            Error::Parse(msg) => Error::Parse(format!("{} ({})", msg, article_ref.url)),
            other => other,
        })?;

        tracing::debug!(
            source = %self.config.id,
            url = %article_ref.url,
            body_chars = extracted.body.chars().count(),
            "Parsed article"
        );

        Ok(Article {
            article_ref: article_ref.clone(),
            title: extracted.title,
            body: extracted.body,
            published_at: extracted
                .published_at
                .or_else(|| date_from_url(&article_ref.url)),
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::retry::RetryPolicy;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_config(base: &str) -> SourceConfig {
        SourceConfig {
            id: "mock".into(),
            name: "Mock News".into(),
            listing_url: format!("{}/latest", base),
            base_url: base.to_string(),
            link_selector: "a.story".into(),
            title_selector: "h1".into(),
            body_selector: "article p".into(),
            date_selector: None,
            article_pattern: Some("^/news/".into()),
            request_delay_ms: 0,
            max_articles: 10,
            min_paragraph_chars: 10,
        }
    }

    fn build(config: SourceConfig) -> HtmlSource {
        let fetcher = HttpFetcher::new(&FetchConfig::default(), RetryPolicy::none()).unwrap();
        HtmlSource::new(config, Arc::new(fetcher), Arc::new(UrlNormalizer::default())).unwrap()
    }

    #[tokio::test]
    async fn test_list_article_refs_filters_and_normalizes() {
        let server = MockServer::start().await;
        let listing = r#"
            <a class="story" href="/news/one/">One</a>
            <a class="story" href="/news/one?utm_source=home">One again</a>
            <a class="story" href="/about">About</a>
            <a class="story" href="https://elsewhere.test/news/evil">Off-site</a>
            <a class="story" href="mailto:tips@example.com">Mail</a>
            <a class="story" href="news/two">Two</a>
        "#;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing))
            .mount(&server)
            .await;

        let source = build(source_config(&server.uri()));
        let refs = source.list_article_refs().await.unwrap();

        let base = server.uri();
        assert_eq!(
            refs,
            vec![
                ArticleRef::new("mock", format!("{}/news/one", base)),
                ArticleRef::new("mock", format!("{}/news/two", base)),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_article_refs_respects_cap() {
        let server = MockServer::start().await;
        let listing: String = (0..20)
            .map(|i| format!(r#"<a class="story" href="/news/{}">n</a>"#, i))
            .collect();
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing))
            .mount(&server)
            .await;

        let mut config = source_config(&server.uri());
        config.max_articles = 3;
        let refs = build(config).list_article_refs().await.unwrap();
        assert_eq!(refs.len(), 3);
        assert!(refs[0].url.ends_with("/news/0"));
    }

    #[tokio::test]
    async fn test_listing_without_matches_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>redesigned</p>"))
            .mount(&server)
            .await;

        let err = build(source_config(&server.uri()))
            .list_article_refs()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[tokio::test]
    async fn test_listing_not_found_is_permanent_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = build(source_config(&server.uri()))
            .list_article_refs()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch { permanent: true, .. }));
    }

    #[tokio::test]
    async fn test_fetch_article() {
        let server = MockServer::start().await;
        let page = r#"
            <h1>Robots learn to fold laundry</h1>
            <article>
              <p>Researchers demonstrated a new manipulation policy.</p>
              <p>ok</p>
            </article>
        "#;
        Mock::given(method("GET"))
            .and(path("/news/2025/06/08/robots"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;

        let source = build(source_config(&server.uri()));
        let article_ref = ArticleRef::new("mock", format!("{}/news/2025/06/08/robots", server.uri()));
        let article = source.fetch_article(&article_ref).await.unwrap();

        assert_eq!(article.article_ref, article_ref);
        assert_eq!(article.title, "Robots learn to fold laundry");
        assert_eq!(article.body, "Researchers demonstrated a new manipulation policy.");
        assert_eq!(
            article.published_at.map(|d| d.date_naive().to_string()),
            Some("2025-06-08".to_string())
        );
    }
}
