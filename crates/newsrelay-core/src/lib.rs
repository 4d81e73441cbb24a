pub mod config;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod publish;
pub mod retry;
pub mod scheduler;
pub mod source;
pub mod storage;
pub mod throttle;

#[cfg(test)]
pub(crate) mod testing;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use message::Formatter;
pub use pipeline::{build_runner, CycleReport, PipelineRunner};
pub use publish::{Publisher, TelegramPublisher};
pub use scheduler::{SchedulerEvent, SchedulerService};
pub use source::{Article, ArticleRef, SourceAdapter};
pub use storage::{Database, DedupStore, SqliteDedupStore};
