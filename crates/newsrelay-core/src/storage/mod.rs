mod database;
mod dedup;
mod retry;

pub use database::Database;
pub use dedup::{DedupRecord, DedupStore, SqliteDedupStore};
