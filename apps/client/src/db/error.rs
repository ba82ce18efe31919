//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("item not found: {owner_id}/{item_id}")]
    ItemNotFound { owner_id: String, item_id: i64 },

    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("repository lock poisoned")]
    LockPoisoned,
}
