//! User operations

use crate::error::Result;
use crate::types::*;
use crate::ArchiveDb;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

impl ArchiveDb {
    /// Create the user row if missing. Returns true if it was created.
    pub async fn ensure_user(&self, username: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        ensure_user_conn(&mut conn, username).await
    }

    /// Get a user by username
    pub async fn get_user(&self, username: &str) -> Result<Option<StoredUser>> {
        let row = sqlx::query(
            r#"SELECT username, name, nick, location, description, verified, profile_image_url,
                      followers_count, friends_count, favourites_count, listed_count,
                      statuses_count, media_count, created_at, last_scanned_at
               FROM users WHERE username = ?"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_user))
    }

    /// List all users with their post counts, ordered by username
    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        let rows = sqlx::query(
            r#"SELECT u.username, u.name, u.last_scanned_at, COUNT(p.post_id) AS post_count
               FROM users u
               LEFT JOIN posts p ON p.username = u.username
               GROUP BY u.username
               ORDER BY u.username"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| UserSummary {
                username: row.get("username"),
                name: row.get("name"),
                post_count: row.get::<i64, _>("post_count") as u64,
                last_scanned_at: row
                    .get::<Option<i64>, _>("last_scanned_at")
                    .map(Self::millis_to_datetime),
            })
            .collect())
    }
}

pub(crate) async fn ensure_user_conn(conn: &mut SqliteConnection, username: &str) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO users (username, created_at) VALUES (?, ?) ON CONFLICT(username) DO NOTHING",
    )
    .bind(username)
    .bind(ArchiveDb::now_millis())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Merge profile fields; NULL binds keep the stored value.
pub(crate) async fn merge_profile_conn(
    conn: &mut SqliteConnection,
    username: &str,
    profile: &UserProfile,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE users SET
            name = COALESCE(?, name),
            nick = COALESCE(?, nick),
            location = COALESCE(?, location),
            description = COALESCE(?, description),
            verified = COALESCE(?, verified),
            profile_image_url = COALESCE(?, profile_image_url),
            followers_count = COALESCE(?, followers_count),
            friends_count = COALESCE(?, friends_count),
            favourites_count = COALESCE(?, favourites_count),
            listed_count = COALESCE(?, listed_count),
            statuses_count = COALESCE(?, statuses_count),
            media_count = COALESCE(?, media_count)
        WHERE username = ?"#,
    )
    .bind(&profile.name)
    .bind(&profile.nick)
    .bind(&profile.location)
    .bind(&profile.description)
    .bind(profile.verified)
    .bind(&profile.profile_image_url)
    .bind(profile.followers_count)
    .bind(profile.friends_count)
    .bind(profile.favourites_count)
    .bind(profile.listed_count)
    .bind(profile.statuses_count)
    .bind(profile.media_count)
    .bind(username)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub(crate) async fn mark_scanned_conn(
    conn: &mut SqliteConnection,
    username: &str,
    scanned_at_millis: i64,
) -> Result<()> {
    sqlx::query("UPDATE users SET last_scanned_at = ? WHERE username = ?")
        .bind(scanned_at_millis)
        .bind(username)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn row_to_user(row: &SqliteRow) -> StoredUser {
    StoredUser {
        username: row.get("username"),
        profile: UserProfile {
            name: row.get("name"),
            nick: row.get("nick"),
            location: row.get("location"),
            description: row.get("description"),
            verified: row.get("verified"),
            profile_image_url: row.get("profile_image_url"),
            followers_count: row.get("followers_count"),
            friends_count: row.get("friends_count"),
            favourites_count: row.get("favourites_count"),
            listed_count: row.get("listed_count"),
            statuses_count: row.get("statuses_count"),
            media_count: row.get("media_count"),
        },
        created_at: ArchiveDb::millis_to_datetime(row.get("created_at")),
        last_scanned_at: row
            .get::<Option<i64>, _>("last_scanned_at")
            .map(ArchiveDb::millis_to_datetime),
    }
}
