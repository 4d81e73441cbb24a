use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Counters for one source in one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub source_id: String,
    pub source_name: String,
    /// The listing page could not be fetched; nothing else was attempted
    pub listing_failed: bool,
    pub discovered: u32,
    pub skipped_duplicate: u32,
    pub skipped_stale: u32,
    pub failed: u32,
    pub published: u32,
}

impl SourceReport {
    pub fn new(source_id: &str, source_name: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            ..Self::default()
        }
    }
}

/// Outcome of one pipeline cycle, sources in configuration order
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub sources: Vec<SourceReport>,
}

impl CycleReport {
    pub fn discovered(&self) -> u32 {
        self.sources.iter().map(|s| s.discovered).sum()
    }

    pub fn skipped_duplicate(&self) -> u32 {
        self.sources.iter().map(|s| s.skipped_duplicate).sum()
    }

    pub fn skipped_stale(&self) -> u32 {
        self.sources.iter().map(|s| s.skipped_stale).sum()
    }

    pub fn failed(&self) -> u32 {
        self.sources.iter().map(|s| s.failed).sum()
    }

    pub fn published(&self) -> u32 {
        self.sources.iter().map(|s| s.published).sum()
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.listing_failed).count()
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} published, {} duplicate, {} stale, {} failed of {} discovered ({} sources unreachable) in {:.1}s",
            self.published(),
            self.skipped_duplicate(),
            self.skipped_stale(),
            self.failed(),
            self.discovered(),
            self.failed_sources(),
            self.duration.as_secs_f64(),
        )
    }
}
