//! Error types for the event log.

/// Errors that can occur during event log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// A database operation failed.
    #[error("event log database error: {0}")]
    Database(#[from] rusqlite::Error),
}
