use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A page could not be retrieved. `permanent` is set for responses that
    /// will not succeed on retry (4xx other than 429).
    #[error("Fetch error for {url}: {message}")]
    Fetch {
        url: String,
        message: String,
        permanent: bool,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Publish error: {message}")]
    Publish {
        message: String,
        transient: bool,
        /// Server-provided wait hint (Telegram `retry_after`)
        retry_after: Option<Duration>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn fetch(url: impl Into<String>, message: impl Into<String>, permanent: bool) -> Self {
        Error::Fetch {
            url: url.into(),
            message: message.into(),
            permanent,
        }
    }

    pub fn publish(message: impl Into<String>, transient: bool) -> Self {
        Error::Publish {
            message: message.into(),
            transient,
            retry_after: None,
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Fetch { permanent, .. } => !permanent,
            Error::Publish { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Wait hint supplied by the remote side, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Publish { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Short label used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Fetch { .. } => "fetch",
            Error::Parse(_) => "parse",
            Error::Storage(_) => "storage",
            Error::Http(_) => "http",
            Error::Publish { .. } => "publish",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::UrlParse(_) => "url",
            Error::Json(_) => "json",
            Error::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::fetch("https://a.test", "timeout", false).is_transient());
        assert!(!Error::fetch("https://a.test", "HTTP 404", true).is_transient());
        assert!(Error::publish("429", true).is_transient());
        assert!(!Error::publish("chat not found", false).is_transient());
        assert!(!Error::Parse("no title".into()).is_transient());
    }

    #[test]
    fn test_retry_after_only_for_publish() {
        let err = Error::Publish {
            message: "Too Many Requests".into(),
            transient: true,
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(Error::fetch("u", "m", false).retry_after(), None);
        assert_eq!(err.kind(), "publish");
    }
}
