//! Post operations (sync writes and timeline reads)

use crate::error::{DbError, Result};
use crate::types::*;
use crate::users::{ensure_user_conn, mark_scanned_conn, merge_profile_conn};
use crate::ArchiveDb;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use tracing::debug;

const POST_SELECT_COLUMNS: &str = "username, post_id, timestamp, timestamp_source, text, media_json, retweet_count, reply_count, favorite_count, bookmark_count, indexed_at";

/// Newest first; numeric post_id as tie-breaker (longer digit string = larger id).
pub(crate) const TIMELINE_ORDER: &str = "ORDER BY timestamp DESC, length(post_id) DESC, post_id DESC";

impl ArchiveDb {
    // ========================================================================
    // Sync Operations
    // ========================================================================

    /// Stored media counts keyed by post_id, for diffing against disk.
    pub async fn stored_media_counts(&self, username: &str) -> Result<HashMap<String, usize>> {
        let rows = sqlx::query("SELECT post_id, media_count FROM posts WHERE username = ?")
            .bind(username)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let post_id: String = row.get("post_id");
                let count: i64 = row.get("media_count");
                (post_id, count.max(0) as usize)
            })
            .collect())
    }

    /// Apply one user's scan result atomically.
    ///
    /// The user row, deletes (rebuild mode), inserts, media refreshes, profile
    /// merge and `last_scanned_at` all commit together or not at all. If the
    /// returned future is dropped before completion the transaction rolls back.
    pub async fn apply_sync_write(&self, write: &SyncWrite) -> Result<WriteStats> {
        let username = write.username.as_str();
        let scanned_at = write.scanned_at.timestamp_millis();
        let mut stats = WriteStats::default();

        let mut tx = self.pool.begin().await?;

        ensure_user_conn(&mut tx, username).await?;

        if write.mode == WriteMode::Rebuild {
            let result = sqlx::query("DELETE FROM posts WHERE username = ?")
                .bind(username)
                .execute(&mut *tx)
                .await?;
            stats.deleted = result.rows_affected();
        }

        for post in &write.inserts {
            match insert_post_conn(&mut tx, username, post, scanned_at).await? {
                InsertOutcome::Inserted => stats.inserted += 1,
                InsertOutcome::Duplicate => {
                    debug!(username, post_id = %post.post_id, "Post already stored by another writer");
                    stats.duplicates += 1;
                }
            }
        }

        for refresh in &write.refreshes {
            stats.media_refreshed += refresh_media_conn(&mut tx, username, refresh).await?;
        }

        if let Some(profile) = write.profile.as_ref().filter(|p| !p.is_empty()) {
            merge_profile_conn(&mut tx, username, profile).await?;
        }

        mark_scanned_conn(&mut tx, username, scanned_at).await?;

        tx.commit().await?;

        Ok(stats)
    }

    // ========================================================================
    // Timeline Reads
    // ========================================================================

    /// Number of stored posts for a user
    pub async fn count_posts(&self, username: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Get one post
    pub async fn get_post(&self, username: &str, post_id: &str) -> Result<Option<StoredPost>> {
        let sql = format!(
            "SELECT {} FROM posts WHERE username = ? AND post_id = ?",
            POST_SELECT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(username)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_post).transpose()
    }

    /// One page of a user's posts, newest first.
    ///
    /// An offset past the end yields an empty page with `has_more = false`.
    pub async fn list_posts(&self, username: &str, offset: u64, limit: u64) -> Result<PostPage> {
        let total = self.count_posts(username).await?;

        if limit == 0 {
            return Ok(PostPage {
                posts: Vec::new(),
                has_more: offset < total,
                offset,
                total,
            });
        }

        // Fetch one extra row to learn whether anything follows this window
        let sql = format!(
            "SELECT {} FROM posts WHERE username = ? {} LIMIT ? OFFSET ?",
            POST_SELECT_COLUMNS, TIMELINE_ORDER
        );
        let rows = sqlx::query(&sql)
            .bind(username)
            .bind(to_sql_int(limit.saturating_add(1)))
            .bind(to_sql_int(offset))
            .fetch_all(&self.pool)
            .await?;

        let mut posts = rows.iter().map(row_to_post).collect::<Result<Vec<_>>>()?;
        let has_more = posts.len() as u64 > limit;
        posts.truncate(limit as usize);

        Ok(PostPage {
            posts,
            has_more,
            offset,
            total,
        })
    }
}

async fn insert_post_conn(
    conn: &mut SqliteConnection,
    username: &str,
    post: &NewPost,
    indexed_at: i64,
) -> Result<InsertOutcome> {
    let media_json = serde_json::to_string(&post.media)?;

    let result = sqlx::query(
        r#"
        INSERT INTO posts (
            username, post_id, timestamp, timestamp_source, text, media_json, media_count,
            retweet_count, reply_count, favorite_count, bookmark_count, raw_json, indexed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(username, post_id) DO NOTHING
        "#,
    )
    .bind(username)
    .bind(&post.post_id)
    .bind(post.timestamp.timestamp_millis())
    .bind(post.timestamp_source.as_str())
    .bind(&post.text)
    .bind(&media_json)
    .bind(post.media.len() as i64)
    .bind(post.engagement.retweet_count)
    .bind(post.engagement.reply_count)
    .bind(post.engagement.favorite_count)
    .bind(post.engagement.bookmark_count)
    .bind(&post.raw_json)
    .bind(indexed_at)
    .execute(&mut *conn)
    .await?;

    Ok(if result.rows_affected() == 0 {
        InsertOutcome::Duplicate
    } else {
        InsertOutcome::Inserted
    })
}

/// Replace the media list only when the new one is longer than what is stored.
async fn refresh_media_conn(
    conn: &mut SqliteConnection,
    username: &str,
    refresh: &MediaRefresh,
) -> Result<u64> {
    let media_json = serde_json::to_string(&refresh.media)?;
    let media_count = refresh.media.len() as i64;

    let result = sqlx::query(
        "UPDATE posts SET media_json = ?, media_count = ? WHERE username = ? AND post_id = ? AND media_count < ?",
    )
    .bind(&media_json)
    .bind(media_count)
    .bind(username)
    .bind(&refresh.post_id)
    .bind(media_count)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

fn row_to_post(row: &SqliteRow) -> Result<StoredPost> {
    let username: String = row.get("username");
    let post_id: String = row.get("post_id");

    let source_str: String = row.get("timestamp_source");
    let timestamp_source = TimestampSource::parse(&source_str).ok_or_else(|| {
        DbError::corrupt(&username, &post_id, format!("unknown timestamp source '{}'", source_str))
    })?;

    let media_json: String = row.get("media_json");
    let media: Vec<String> = serde_json::from_str(&media_json)
        .map_err(|e| DbError::corrupt(&username, &post_id, format!("media list: {}", e)))?;

    Ok(StoredPost {
        timestamp: ArchiveDb::millis_to_datetime(row.get("timestamp")),
        timestamp_source,
        text: row.get("text"),
        media,
        engagement: Engagement {
            retweet_count: row.get("retweet_count"),
            reply_count: row.get("reply_count"),
            favorite_count: row.get("favorite_count"),
            bookmark_count: row.get("bookmark_count"),
        },
        indexed_at: ArchiveDb::millis_to_datetime(row.get("indexed_at")),
        username,
        post_id,
    })
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
