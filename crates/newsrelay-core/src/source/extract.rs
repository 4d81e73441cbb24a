//! Selector-driven extraction from listing and article markup.
//!
//! Everything here is synchronous: `scraper::Html` is not `Send`, so pages
//! are parsed and dropped without crossing an `.await`.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::config::SourceConfig;
use crate::{Error, Result};

/// Title, body and optional date pulled out of an article page
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedArticle {
    pub title: String,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Compiled selectors for one source
#[derive(Debug)]
pub struct Extractor {
    link: Selector,
    title: Selector,
    body: Selector,
    date: Option<Selector>,
    min_paragraph_chars: usize,
}

fn parse_selector(field: &str, value: &str) -> Result<Selector> {
    Selector::parse(value)
        .map_err(|e| Error::Config(format!("invalid {} '{}': {}", field, value, e)))
}

/// Element text with whitespace runs collapsed to single spaces
fn element_text(element: &ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

impl Extractor {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            link: parse_selector("link_selector", &config.link_selector)?,
            title: parse_selector("title_selector", &config.title_selector)?,
            body: parse_selector("body_selector", &config.body_selector)?,
            date: config
                .date_selector
                .as_deref()
                .map(|s| parse_selector("date_selector", s))
                .transpose()?,
            min_paragraph_chars: config.min_paragraph_chars,
        })
    }

    /// Raw `href` values of every element matching the link selector, in
    /// document order. Fails with `Parse` when the selector matches nothing.
    pub fn extract_links(&self, html: &str) -> Result<Vec<String>> {
        let document = Html::parse_document(html);
        let mut matched = false;
        let mut hrefs = Vec::new();

        for element in document.select(&self.link) {
            matched = true;
            if let Some(href) = element.value().attr("href") {
                let href = href.trim();
                if !href.is_empty() {
                    hrefs.push(href.to_string());
                }
            }
        }

        if !matched {
            return Err(Error::Parse("link selector matched no elements".into()));
        }
        Ok(hrefs)
    }

    pub fn extract_article(&self, html: &str) -> Result<ExtractedArticle> {
        let document = Html::parse_document(html);

        let title = document
            .select(&self.title)
            .map(|e| element_text(&e))
            .find(|t| !t.is_empty())
            .ok_or_else(|| Error::Parse("title selector matched no text".into()))?;

        let paragraphs: Vec<String> = document
            .select(&self.body)
            .map(|e| element_text(&e))
            .filter(|t| t.chars().count() >= self.min_paragraph_chars.max(1))
            .collect();
        if paragraphs.is_empty() {
            return Err(Error::Parse("body selector matched no usable paragraphs".into()));
        }

        let published_at = self.date.as_ref().and_then(|selector| {
            document.select(selector).find_map(|element| {
                let value = element.value();
                value
                    .attr("datetime")
                    .or_else(|| value.attr("content"))
                    .map(str::to_string)
                    .or_else(|| Some(element_text(&element)))
                    .and_then(|raw| parse_date(&raw))
            })
        });

        Ok(ExtractedArticle {
            title,
            body: paragraphs.join("\n\n"),
            published_at,
        })
    }
}

const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y", "%Y/%m/%d"];

/// Parse the date formats news sites commonly expose. Dates without a zone
/// are taken as UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

static URL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(\d{4})[/-](\d{2})[/-](\d{2})(?:[/-]|$)").expect("valid date regex")
});

/// Date embedded in an article path such as `/2025/06/08/slug` or `/2025-06-08-slug`
pub fn date_from_url(url: &str) -> Option<DateTime<Utc>> {
    let caps = URL_DATE.captures(url)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}
