use thiserror::Error;

use crate::types::ItemStatus;

/// Errors raised by queue store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The item (or request) is malformed and never enters the queue.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested status change would leave a terminal state or skip one.
    #[error("invalid transition for item {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ItemStatus,
        to: ItemStatus,
    },

    /// Underlying SQLite / rusqlite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Settings document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
