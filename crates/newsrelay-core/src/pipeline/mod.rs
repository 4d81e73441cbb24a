mod claims;
mod report;
mod runner;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::message::Formatter;
use crate::publish::TelegramPublisher;
use crate::source::build_sources;
use crate::storage::{Database, SqliteDedupStore};
use crate::Result;

pub use report::{CycleReport, SourceReport};
pub use runner::PipelineRunner;

/// Wire the configured sources, the SQLite store and the Telegram
/// publisher into a runner
pub fn build_runner(config: &AppConfig, db: Database) -> Result<PipelineRunner> {
    let sources = build_sources(config)?;
    let store = Arc::new(SqliteDedupStore::new(db));
    let publisher = Arc::new(TelegramPublisher::new(&config.telegram, config.retry.policy())?);

    Ok(PipelineRunner::new(
        sources,
        store,
        publisher,
        Formatter::from_config(&config.format),
    )
    .with_max_article_age(config.pipeline.max_article_age_days))
}
