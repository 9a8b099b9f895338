//! Bounded append-only event log for the Vigil dashboard.
//!
//! Every message the bus listener receives is persisted here with a
//! monotonically increasing id, then pruned back to a retention window by
//! a periodic background sweep. The log is the source of truth for the
//! history API; the live feed is best-effort on top of it.
//!
//! # Invariants
//!
//! - ids are strictly increasing in arrival order and never reused
//!   (SQLite `AUTOINCREMENT`), so pruning can never cause a duplicate id.
//! - events are immutable once appended; the only delete path is
//!   [`prune_events`], which keeps exactly the newest `max_retained` rows.

mod error;
mod event;
mod store;

pub use error::LogError;
pub use event::{capture_timestamp, time_of_day, LogEvent, LogFrame};
pub use store::{append_event, count_events, prune_events, recent_events, DEFAULT_HISTORY_LIMIT};

#[cfg(test)]
mod tests;
