//! Retry of transient SQLite failures.
//!
//! Lock contention and I/O hiccups (busy WAL snapshots, short reads while a
//! sync client touches the file) clear up on their own; everything else is
//! returned to the caller immediately.

use std::future::Future;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// Maximum number of attempts for database operations
pub const MAX_ATTEMPTS: u32 = 5;

/// Check if a SQLite error is transient and should be retried
///
/// This includes:
/// - SQLITE_BUSY (5): Database locked by another connection
/// - SQLITE_LOCKED (6): Database table is locked
/// - SQLITE_IOERR (10): Base I/O error
/// - SQLITE_IOERR_READ (266): I/O error during read (10 | 1<<8)
/// - SQLITE_IOERR_SHORT_READ (522): Read returned fewer bytes than expected (10 | 2<<8)
/// - SQLITE_BUSY_SNAPSHOT (1032): Busy due to WAL snapshot (5 | 4<<8)
/// - SQLITE_IOERR_WRITE (2314): I/O error during write (10 | 9<<8)
/// - SQLITE_IOERR_FSYNC (3338): I/O error during fsync (10 | 13<<8)
/// - SQLITE_IOERR_LOCK (5386): I/O error getting file lock (10 | 21<<8)
pub(crate) fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string());
            matches!(
                code.as_deref(),
                Some("5")     // SQLITE_BUSY
                | Some("6")   // SQLITE_LOCKED
                | Some("10")  // SQLITE_IOERR
                | Some("266") // SQLITE_IOERR_READ
                | Some("522") // SQLITE_IOERR_SHORT_READ
                | Some("1032") // SQLITE_BUSY_SNAPSHOT
                | Some("2314") // SQLITE_IOERR_WRITE
                | Some("3338") // SQLITE_IOERR_FSYNC
                | Some("5386") // SQLITE_IOERR_LOCK
            )
        }
        _ => false,
    }
}

/// Backoff for database operations: 200ms doubling, capped at 3.2s
pub fn storage_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: MAX_ATTEMPTS,
        initial_backoff: Duration::from_millis(200),
        multiplier: 2.0,
        max_backoff: Duration::from_millis(3200),
    }
}

fn is_transient_storage(err: &Error) -> bool {
    matches!(err, Error::Storage(inner) if is_transient_error(inner))
}

/// Run a query, retrying transient SQLite errors with exponential backoff
pub async fn with_retry<F, Fut, T>(operation: &str, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    storage_policy()
        .run_if(operation, is_transient_storage, |_| {
            let fut = op();
            async move { fut.await.map_err(Error::from) }
        })
        .await
}
