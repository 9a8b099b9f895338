//! Persistence operations for the event log.
//!
//! All writes go through [`append_event`], which assigns the capture
//! timestamp and inserts into the `events` table in a single statement,
//! returning the assigned id. Reads go through [`recent_events`]; the
//! retention sweep calls [`prune_events`].
//!
//! Id assignment rides on SQLite's `AUTOINCREMENT`: the database serializes
//! writers, so concurrent appends from separate connections can never race
//! on an id, and a prune interleaved with an append always leaves the newly
//! appended row intact (the prune keeps the highest ids, and the new row's
//! id is higher than anything the prune's subquery selected).

use rusqlite::{params, Connection};

use crate::error::LogError;
use crate::event::{capture_timestamp, LogEvent};

/// Default number of events returned by the history API.
pub const DEFAULT_HISTORY_LIMIT: i64 = 200;

/// Appends a single event to the log, assigning the next id and the
/// current capture timestamp.
///
/// # Errors
///
/// Returns `LogError::Database` on SQL failure. Callers on the hot path
/// (the bus listener) must treat this as non-fatal: the event is still
/// broadcast to live viewers without an id.
pub fn append_event(conn: &Connection, topic: &str, payload: &str) -> Result<LogEvent, LogError> {
    let timestamp = capture_timestamp();

    let id: i64 = conn.query_row(
        "INSERT INTO events (timestamp, topic, payload)
         VALUES (?1, ?2, ?3)
         RETURNING id",
        params![timestamp, topic, payload],
        |row| row.get(0),
    )?;

    Ok(LogEvent {
        id,
        timestamp,
        topic: topic.to_string(),
        payload: payload.to_string(),
    })
}

/// Returns up to `limit` most-recent events in ascending id order
/// (oldest first), so viewers can render history chronologically.
///
/// A non-positive `limit` returns an empty list.
///
/// # Errors
///
/// Returns `LogError::Database` on SQL failure.
pub fn recent_events(conn: &Connection, limit: i64) -> Result<Vec<LogEvent>, LogError> {
    if limit <= 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT id, timestamp, topic, payload FROM events
         ORDER BY id DESC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit], |row| {
        Ok(LogEvent {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            topic: row.get(2)?,
            payload: row.get(3)?,
        })
    })?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }

    // Newest-first from the query; the API contract is oldest-first.
    events.reverse();
    Ok(events)
}

/// Deletes all events except the `max_retained` newest by id.
///
/// Returns the number of rows deleted. Calling this on a log already
/// within the bound is a no-op, so repeated sweeps are idempotent.
///
/// # Errors
///
/// Returns `LogError::Database` on SQL failure. The retention sweep logs
/// the error and retries on its next tick.
pub fn prune_events(conn: &Connection, max_retained: i64) -> Result<usize, LogError> {
    let deleted = conn.execute(
        "DELETE FROM events
         WHERE id NOT IN (
             SELECT id FROM events ORDER BY id DESC LIMIT ?1
         )",
        [max_retained.max(0)],
    )?;

    if deleted > 0 {
        tracing::debug!(deleted, max_retained, "pruned event log");
    }

    Ok(deleted)
}

/// Returns the total number of events currently in the log.
///
/// # Errors
///
/// Returns `LogError::Database` on SQL failure.
pub fn count_events(conn: &Connection) -> Result<i64, LogError> {
    let count = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
    Ok(count)
}
