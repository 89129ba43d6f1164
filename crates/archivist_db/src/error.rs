//! Error types for the database layer.

use thiserror::Error;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, transaction)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error while preparing the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database file or row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored row could not be decoded back into a domain value
    #[error("Corrupt row for {username}/{post_id}: {reason}")]
    CorruptRow {
        username: String,
        post_id: String,
        reason: String,
    },

    /// Media list (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub(crate) fn corrupt(username: &str, post_id: &str, reason: impl Into<String>) -> Self {
        Self::CorruptRow {
            username: username.to_string(),
            post_id: post_id.to_string(),
            reason: reason.into(),
        }
    }
}
