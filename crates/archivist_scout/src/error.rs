//! Error types for the scan engine
//!
//! [`ScoutError`] aborts one user's scan. [`ParseError`] only ever affects a
//! single content unit and is collected into the scan summary.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal, per-user error.
#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Cannot read directory {path}: {source}")]
    UnreadableDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Archive root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Scan already in progress for user '{0}'")]
    ScanAlreadyInProgress(String),

    #[error("Scan of user '{username}' timed out after {secs}s")]
    Timeout { username: String, secs: u64 },

    #[error("Database error: {0}")]
    Database(#[from] archivist_db::DbError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl ScoutError {
    /// Wrap an IO error raised while listing `path`.
    pub fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::UnreadableDirectory {
            path: path.into(),
            source,
        }
    }

    /// True if the user was skipped because another scan holds its lock.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::ScanAlreadyInProgress(_))
    }
}

/// Item-level failure for one content unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed metadata in {file}: {reason}")]
    MalformedMetadata { file: String, reason: String },

    #[error("Cannot read sidecar {file}: {reason}")]
    UnreadableSidecar { file: String, reason: String },

    #[error("No timestamp available for post {0}")]
    MissingTimestamp(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ScoutError>;
