use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Environment variable that overrides `telegram.bot_token`
pub const BOT_TOKEN_ENV: &str = "NEWSRELAY_BOT_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub format: FormatConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path (holds the dedup database)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level, used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Telegram chat identifier: numeric id or `@channelusername`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatId {
    Id(i64),
    Username(String),
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Id(id) => write!(f, "{}", id),
            ChatId::Username(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token (can also come from NEWSRELAY_BOT_TOKEN)
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Target chat or channel
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    /// Bot API base URL
    #[serde(default = "default_telegram_api_base_url")]
    pub api_base_url: String,
    /// Minimum spacing between two sends in milliseconds
    #[serde(default = "default_min_send_interval")]
    pub min_send_interval_ms: u64,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base_url: default_telegram_api_base_url(),
            min_send_interval_ms: default_min_send_interval(),
            request_timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    /// Fixed User-Agent; when unset a pool of browser agents is rotated
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Pages larger than this are rejected
    #[serde(default = "default_max_page_bytes")]
    pub max_page_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout(),
            user_agent: None,
            max_page_bytes: default_max_page_bytes(),
        }
    }
}

/// Backoff parameters shared by page fetching and publishing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            multiplier: self.backoff_multiplier,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Unit used when cutting an article body down to `max_body_length`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncateUnit {
    #[default]
    Chars,
    Words,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    /// Maximum body length, counted in `truncate_by` units
    #[serde(default = "default_max_body_length")]
    pub max_body_length: usize,
    #[serde(default)]
    pub truncate_by: TruncateUnit,
    /// Marker appended after a truncated body
    #[serde(default = "default_ellipsis")]
    pub ellipsis: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            max_body_length: default_max_body_length(),
            truncate_by: TruncateUnit::default(),
            ellipsis: default_ellipsis(),
        }
    }
}

/// Longest accepted cycle interval (one year)
pub const MAX_INTERVAL_HOURS: u64 = 24 * 366;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Hours between the starts of two consecutive cycles
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
        }
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }
}

/// Query parameters removed from article URLs before they become dedup keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Exact parameter names (case-insensitive)
    #[serde(default = "default_tracking_params")]
    pub tracking_params: Vec<String>,
    /// Parameter name prefixes (case-insensitive)
    #[serde(default = "default_tracking_param_prefixes")]
    pub tracking_param_prefixes: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            tracking_params: default_tracking_params(),
            tracking_param_prefixes: default_tracking_param_prefixes(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Skip articles whose known publication date is older than this
    #[serde(default)]
    pub max_article_age_days: Option<u32>,
}

/// Declarative description of one news site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable identifier, part of the dedup key
    pub id: String,
    /// Display name used in the outbound message
    pub name: String,
    /// Page listing recent articles
    pub listing_url: String,
    /// Base for resolving relative links; also defines the allowed host
    pub base_url: String,
    /// Selector for article links on the listing page (`href` is read)
    pub link_selector: String,
    /// Selector for the article title (first match wins)
    pub title_selector: String,
    /// Selector for body paragraphs (all matches are joined)
    pub body_selector: String,
    /// Selector for the publication date element
    #[serde(default)]
    pub date_selector: Option<String>,
    /// Regex an article URL path must match
    #[serde(default)]
    pub article_pattern: Option<String>,
    /// Minimum delay between two requests to this source's host
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
    /// Maximum number of article links taken from one listing
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    /// Body paragraphs shorter than this are dropped (ads, captions)
    #[serde(default = "default_min_paragraph_chars")]
    pub min_paragraph_chars: usize,
}

impl SourceConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("newsrelay")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_telegram_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_min_send_interval() -> u64 {
    1000
}

fn default_timeout() -> u64 {
    30
}

fn default_max_page_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_max_body_length() -> usize {
    3000 // Telegram caps messages at 4096 chars
}

fn default_ellipsis() -> String {
    "...".to_string()
}

fn default_interval_hours() -> u64 {
    1
}

fn default_tracking_params() -> Vec<String> {
    [
        "fbclid", "gclid", "dclid", "msclkid", "yclid", "mc_cid", "mc_eid", "igshid", "ref",
        "ref_src", "_ga", "_hsenc", "_hsmi", "cmpid", "ncid", "ocid", "smid",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_tracking_param_prefixes() -> Vec<String> {
    vec!["utm_".to_string()]
}

fn default_request_delay() -> u64 {
    2000
}

fn default_max_articles() -> usize {
    10
}

fn default_min_paragraph_chars() -> usize {
    50
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load, apply environment overrides and validate.
    /// A missing file is an error: there is nothing useful to run without sources.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        if !config_path.exists() {
            return Err(crate::Error::Config(format!(
                "config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(&config_path)?;
        let mut config = Self::from_toml_str(&content)?;

        if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.telegram.bot_token = Some(token);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse without validation
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Reject configurations that cannot produce a working pipeline
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error::Config;

        if self.telegram.bot_token.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err(Config(format!(
                "telegram.bot_token is not set (or set {})",
                BOT_TOKEN_ENV
            )));
        }
        if self.telegram.chat_id.is_none() {
            return Err(Config("telegram.chat_id is not set".into()));
        }
        url::Url::parse(&self.telegram.api_base_url)
            .map_err(|e| Config(format!("telegram.api_base_url: {}", e)))?;

        if !(1..=MAX_INTERVAL_HOURS).contains(&self.schedule.interval_hours) {
            return Err(Config(format!(
                "schedule.interval_hours must be between 1 and {}",
                MAX_INTERVAL_HOURS
            )));
        }
        if self.format.max_body_length == 0 {
            return Err(Config("format.max_body_length must be positive".into()));
        }
        if self.sources.is_empty() {
            return Err(Config("no [[sources]] configured".into()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(Config(format!("source '{}' has an empty id", source.name)));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(Config(format!("duplicate source id '{}'", source.id)));
            }
            source.validate()?;
        }

        Ok(())
    }

    /// Default configuration file path: ~/.config/newsrelay/config.toml
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("newsrelay")
            .join("config.toml")
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("newsrelay.db")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }
}

impl SourceConfig {
    fn validate(&self) -> crate::Result<()> {
        use crate::Error::Config;

        for (field, value) in [
            ("listing_url", &self.listing_url),
            ("base_url", &self.base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| Config(format!("source '{}' {}: {}", self.id, field, e)))?;
        }

        let mut selectors = vec![
            ("link_selector", &self.link_selector),
            ("title_selector", &self.title_selector),
            ("body_selector", &self.body_selector),
        ];
        if let Some(ref date) = self.date_selector {
            selectors.push(("date_selector", date));
        }
        for (field, value) in selectors {
            scraper::Selector::parse(value).map_err(|e| {
                Config(format!("source '{}' {} '{}': {}", self.id, field, value, e))
            })?;
        }

        if let Some(ref pattern) = self.article_pattern {
            regex::Regex::new(pattern)
                .map_err(|e| Config(format!("source '{}' article_pattern: {}", self.id, e)))?;
        }

        if self.max_articles == 0 {
            return Err(Config(format!("source '{}' max_articles must be positive", self.id)));
        }

        Ok(())
    }
}
