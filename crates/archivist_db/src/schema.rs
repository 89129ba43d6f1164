//! Database schema creation.
//!
//! All CREATE TABLE statements live here - single source of truth.
//! Timestamps are INTEGER milliseconds since Unix epoch (UTC).

use crate::error::Result;
use crate::ArchiveDb;
use tracing::debug;

impl ArchiveDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // Users: one row per top-level archive directory
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS users (
                username TEXT PRIMARY KEY,
                name TEXT,
                nick TEXT,
                location TEXT,
                description TEXT,
                verified INTEGER,
                profile_image_url TEXT,
                followers_count INTEGER,
                friends_count INTEGER,
                favourites_count INTEGER,
                listed_count INTEGER,
                statuses_count INTEGER,
                media_count INTEGER,
                created_at INTEGER NOT NULL,
                last_scanned_at INTEGER
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // Posts: one row per content unit, immutable apart from media refresh
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS posts (
                username TEXT NOT NULL REFERENCES users(username) ON DELETE CASCADE,
                post_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                timestamp_source TEXT NOT NULL CHECK (timestamp_source IN ('metadata', 'mtime')),
                text TEXT NOT NULL DEFAULT '',
                media_json TEXT NOT NULL DEFAULT '[]',
                media_count INTEGER NOT NULL DEFAULT 0,
                retweet_count INTEGER,
                reply_count INTEGER,
                favorite_count INTEGER,
                bookmark_count INTEGER,
                raw_json TEXT,
                indexed_at INTEGER NOT NULL,
                UNIQUE(username, post_id)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        self.add_missing_user_columns().await?;

        // Newest-first paging per user; columns must match TIMELINE_ORDER
        sqlx::query("DROP INDEX IF EXISTS idx_posts_user_timeline")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_posts_user_timeline_numeric
               ON posts(username, timestamp DESC, length(post_id) DESC, post_id DESC)"#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Database schema verified");
        Ok(())
    }

    /// Profile columns added after the first release.
    async fn add_missing_user_columns(&self) -> Result<()> {
        let existing: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('users')")
                .fetch_all(&self.pool)
                .await?;

        for column in ["favourites_count", "listed_count"] {
            if existing.iter().any(|c| c == column) {
                continue;
            }
            sqlx::query(&format!("ALTER TABLE users ADD COLUMN {} INTEGER", column))
                .execute(&self.pool)
                .await?;
            debug!(column, "Added users column");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::posts::TIMELINE_ORDER;
    use crate::ArchiveDb;
    use sqlx::Row;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_timeline_sort_uses_index() {
        let tmp = TempDir::new().unwrap();
        let db = ArchiveDb::open(tmp.path().join("plan.db")).await.unwrap();

        let sql = format!(
            "EXPLAIN QUERY PLAN SELECT post_id FROM posts WHERE username = ? {} LIMIT 10",
            TIMELINE_ORDER
        );
        let rows = sqlx::query(&sql)
            .bind("alice")
            .fetch_all(db.pool())
            .await
            .unwrap();
        let plan: Vec<String> = rows.iter().map(|r| r.get::<String, _>("detail")).collect();

        assert!(
            plan.iter().any(|d| d.contains("idx_posts_user_timeline_numeric")),
            "plan: {:?}",
            plan
        );
        assert!(!plan.iter().any(|d| d.contains("TEMP B-TREE")), "plan: {:?}", plan);
    }

    #[tokio::test]
    async fn test_open_adds_profile_columns_to_older_users_table() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("old.db");

        let db = ArchiveDb::open(&path).await.unwrap();
        sqlx::query("DROP TABLE posts").execute(db.pool()).await.unwrap();
        sqlx::query("DROP TABLE users").execute(db.pool()).await.unwrap();
        sqlx::query(
            "CREATE TABLE users (username TEXT PRIMARY KEY, name TEXT, nick TEXT, location TEXT,
                description TEXT, verified INTEGER, profile_image_url TEXT, followers_count INTEGER,
                friends_count INTEGER, statuses_count INTEGER, media_count INTEGER,
                created_at INTEGER NOT NULL, last_scanned_at INTEGER)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query("INSERT INTO users (username, created_at) VALUES ('alice', 0)")
            .execute(db.pool())
            .await
            .unwrap();
        db.close().await;

        let db = ArchiveDb::open_existing(&path).await.unwrap();
        let user = db.get_user("alice").await.unwrap().unwrap();
        assert_eq!(user.profile.favourites_count, None);
        assert_eq!(user.profile.listed_count, None);
    }
}
