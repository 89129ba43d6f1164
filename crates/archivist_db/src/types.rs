//! Row types shared by the engine and the query layer.
//!
//! These types are the single source of truth for what is persisted. The scan
//! engine builds [`NewPost`] values, the query layer hands out [`StoredPost`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// User Types
// ============================================================================

/// Profile fields harvested from post sidecars.
///
/// Every field is optional; absent fields never overwrite stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub nick: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub verified: Option<bool>,
    pub profile_image_url: Option<String>,
    pub followers_count: Option<i64>,
    pub friends_count: Option<i64>,
    pub favourites_count: Option<i64>,
    pub listed_count: Option<i64>,
    pub statuses_count: Option<i64>,
    pub media_count: Option<i64>,
}

impl UserProfile {
    /// True if no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    pub username: String,
    pub profile: UserProfile,
    pub created_at: DateTime<Utc>,
    /// Absent until the first successful scan
    pub last_scanned_at: Option<DateTime<Utc>>,
}

/// A user row with its post count, for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub username: String,
    pub name: Option<String>,
    pub post_count: u64,
    pub last_scanned_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Post Types
// ============================================================================

/// Where a post's timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    /// Read from a sidecar metadata file
    Metadata,
    /// Fallback: filesystem modification time of the unit's first file
    ModifiedTime,
}

impl TimestampSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::ModifiedTime => "mtime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "metadata" => Some(Self::Metadata),
            "mtime" => Some(Self::ModifiedTime),
            _ => None,
        }
    }
}

impl std::fmt::Display for TimestampSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Engagement counters copied from a JSON sidecar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Engagement {
    pub retweet_count: Option<i64>,
    pub reply_count: Option<i64>,
    pub favorite_count: Option<i64>,
    pub bookmark_count: Option<i64>,
}

/// A post ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub post_id: String,
    pub timestamp: DateTime<Utc>,
    pub timestamp_source: TimestampSource,
    pub text: String,
    /// Paths relative to the user's directory, in authored order
    pub media: Vec<String>,
    pub engagement: Engagement,
    /// Raw sidecar JSON, kept verbatim for consumers that need more fields
    pub raw_json: Option<String>,
}

/// A persisted post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPost {
    pub username: String,
    pub post_id: String,
    pub timestamp: DateTime<Utc>,
    pub timestamp_source: TimestampSource,
    pub text: String,
    pub media: Vec<String>,
    pub engagement: Engagement,
    pub indexed_at: DateTime<Utc>,
}

/// Replace the media list of an already-indexed post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRefresh {
    pub post_id: String,
    pub media: Vec<String>,
}

/// One page of posts, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub posts: Vec<StoredPost>,
    pub has_more: bool,
    pub offset: u64,
    pub total: u64,
}

// ============================================================================
// Write Types
// ============================================================================

/// How a sync write treats the rows already stored for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Keep existing rows; insert new ones and apply media refreshes
    Incremental,
    /// Delete every stored row for the user, then insert
    Rebuild,
}

/// Everything one user scan writes, applied as a single transaction.
#[derive(Debug, Clone)]
pub struct SyncWrite {
    pub username: String,
    pub mode: WriteMode,
    pub profile: Option<UserProfile>,
    pub inserts: Vec<NewPost>,
    pub refreshes: Vec<MediaRefresh>,
    pub scanned_at: DateTime<Utc>,
}

/// Result of a single post insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another writer already stored this `(username, post_id)`; first writer wins
    Duplicate,
}

/// Row counts produced by a committed [`SyncWrite`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub inserted: u64,
    pub duplicates: u64,
    pub media_refreshed: u64,
    pub deleted: u64,
}
