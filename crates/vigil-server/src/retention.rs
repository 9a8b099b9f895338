//! Background task enforcing the event log retention window.

use std::time::Duration;

use tokio::time::sleep;
use vigil_db::DbPool;
use vigil_log::LogError;

/// Starts a background task that periodically prunes the event log down
/// to `max_retained` events.
///
/// Runs indefinitely and independently of listener state; retention
/// proceeds even while the bus is disconnected. A failed sweep is logged
/// and simply retried on the next tick.
pub async fn start_retention_task(pool: DbPool, max_retained: i64, interval: Duration) {
    tracing::info!(
        max_retained,
        interval_secs = interval.as_secs(),
        "starting event log retention task"
    );

    loop {
        // Sleep first so startup is not immediately followed by a sweep of
        // a log the previous run already pruned.
        sleep(interval).await;

        let pool_clone = pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = pool_clone.get().map_err(|e| {
                // Surface pool exhaustion as a real failure rather than
                // silently skipping the sweep.
                LogError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                    Some(format!("pool connection error: {}", e)),
                ))
            })?;
            vigil_log::prune_events(&conn, max_retained)
        })
        .await;

        match result {
            Ok(Ok(deleted)) => {
                if deleted > 0 {
                    tracing::info!(deleted, max_retained, "pruned event log");
                } else {
                    tracing::debug!("event log already within retention window");
                }
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "retention sweep failed, will retry next interval");
            }
            Err(e) => {
                tracing::error!(error = %e, "retention sweep panicked or was cancelled");
            }
        }
    }
}
