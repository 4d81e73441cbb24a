use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, StatusCode};
use url::Url;

use crate::config::FetchConfig;
use crate::retry::RetryPolicy;
use crate::throttle::HostThrottle;
use crate::{Error, Result};

// Rotating User-Agent pool - mimics different browsers for better compatibility
static USER_AGENT_INDEX: AtomicUsize = AtomicUsize::new(0);
const USER_AGENTS: &[&str] = &[
    // Chrome on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Firefox on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    // Safari on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Get the next User-Agent in rotation
fn next_user_agent() -> &'static str {
    let index = USER_AGENT_INDEX.fetch_add(1, Ordering::Relaxed) % USER_AGENTS.len();
    USER_AGENTS[index]
}

/// HTTP page fetcher shared by all sources.
///
/// Owns the retry policy and the per-host throttle so every adapter gets the
/// same timeout, backoff and politeness behavior.
pub struct HttpFetcher {
    client: Client,
    user_agent: Option<String>,
    max_page_bytes: usize,
    retry: RetryPolicy,
    hosts: HostThrottle,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            max_page_bytes: config.max_page_bytes,
            retry,
            hosts: HostThrottle::new(),
        })
    }

    /// Build browser-like headers for a request
    fn build_headers(user_agent: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        if let Ok(ua) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, ua);
        }
        headers
    }

    /// Fetch a page as text, waiting at least `host_delay` since the previous
    /// request to the same host. Transient failures are retried per policy.
    pub async fn fetch_page(&self, url: &Url, host_delay: Duration) -> Result<String> {
        self.retry
            .run("fetch_page", move |attempt| async move {
                self.fetch_once(url, host_delay, attempt).await
            })
            .await
    }

    async fn fetch_once(&self, url: &Url, host_delay: Duration, attempt: u32) -> Result<String> {
        if let Some(host) = url.host_str() {
            self.hosts.wait(host, host_delay).await;
        }

        let user_agent = self.user_agent.as_deref().unwrap_or_else(|| next_user_agent());
        tracing::debug!(%url, attempt, "Fetching page");

        let response = self
            .client
            .get(url.clone())
            .headers(Self::build_headers(user_agent))
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(
                url.as_str(),
                format!("HTTP {}", status),
                is_permanent_status(status),
            ));
        }

        if let Some(length) = response.content_length() {
            self.ensure_content_size(length as usize, url)?;
        }

        let bytes = response.bytes().await.map_err(|e| request_error(url, e))?;
        self.ensure_content_size(bytes.len(), url)?;

        if is_cloudflare_challenge(&bytes) {
            return Err(Error::fetch(
                url.as_str(),
                "Cloudflare JavaScript challenge page",
                true,
            ));
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn ensure_content_size(&self, size: usize, url: &Url) -> Result<()> {
        if size > self.max_page_bytes {
            return Err(Error::fetch(
                url.as_str(),
                format!("Page too large ({} bytes)", size),
                true,
            ));
        }
        Ok(())
    }
}

/// 4xx responses will not change on retry, except 429 which is a rate limit
fn is_permanent_status(status: StatusCode) -> bool {
    status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS
}

/// Timeouts, connection failures and interrupted bodies are transient;
/// malformed requests and redirect loops are not.
fn request_error(url: &Url, err: reqwest::Error) -> Error {
    let permanent = err.is_builder() || err.is_redirect();
    Error::fetch(url.as_str(), err.without_url().to_string(), permanent)
}

/// Check the first 2KB for Cloudflare challenge markers
fn is_cloudflare_challenge(content: &[u8]) -> bool {
    let check_len = content.len().min(2048);
    let preview = String::from_utf8_lossy(&content[..check_len]);

    preview.contains("cf-browser-verification")
        || preview.contains("_cf_chl_opt")
        || preview.contains("challenge-platform")
}
