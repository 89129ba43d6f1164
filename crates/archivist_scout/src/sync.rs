//! Synchronization engine
//!
//! Reconciles one user's parsed posts against the stored rows. The diff is a
//! pure function ([`SyncPlan`]); the engine wraps it with the per-user lock,
//! the concurrency limit, the timeout and the single write transaction.

use crate::cancel::CancellationToken;
use crate::config::ArchiveConfig;
use crate::error::{Result, ScoutError};
use crate::locks::UserLocks;
use crate::parser::ParsedPost;
use crate::report::{SweepReport, SyncSummary};
use crate::scanner::ArchiveScanner;
use crate::source::ArchiveSource;
use archivist_db::{ArchiveDb, MediaRefresh, NewPost, SyncWrite, UserProfile, WriteMode};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

const DEFAULT_MAX_CONCURRENT_SCANS: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// Insert unseen posts, refresh grown media lists, never delete
    #[default]
    Incremental,
    /// Drop the user's stored posts and rebuild from disk
    Forced,
}

impl SyncMode {
    pub fn from_force_flag(force: bool) -> Self {
        if force {
            Self::Forced
        } else {
            Self::Incremental
        }
    }
}

/// Diff between disk and store for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    pub mode: WriteMode,
    pub inserts: Vec<NewPost>,
    pub refreshes: Vec<MediaRefresh>,
    /// Stored posts left as they are
    pub unchanged: u64,
}

impl SyncPlan {
    /// `disk - stored` becomes inserts; stored posts whose media list grew on
    /// disk become refreshes.
    pub fn incremental(posts: &[ParsedPost], stored_media: &HashMap<String, usize>) -> Self {
        let mut plan = Self::empty(WriteMode::Incremental);

        for post in posts {
            match stored_media.get(&post.post_id) {
                None => plan.inserts.push(post.to_new_post()),
                Some(&count) if post.media.len() > count => plan.refreshes.push(MediaRefresh {
                    post_id: post.post_id.clone(),
                    media: post.media.clone(),
                }),
                Some(_) => plan.unchanged += 1,
            }
        }

        plan
    }

    /// Everything on disk is inserted after the user's rows are deleted.
    pub fn forced(posts: &[ParsedPost]) -> Self {
        let mut plan = Self::empty(WriteMode::Rebuild);
        plan.inserts = posts.iter().map(ParsedPost::to_new_post).collect();
        plan
    }

    fn empty(mode: WriteMode) -> Self {
        Self {
            mode,
            inserts: Vec::new(),
            refreshes: Vec::new(),
            unchanged: 0,
        }
    }

    pub fn into_write(
        self,
        username: &str,
        profile: Option<UserProfile>,
        scanned_at: DateTime<Utc>,
    ) -> SyncWrite {
        SyncWrite {
            username: username.to_string(),
            mode: self.mode,
            profile,
            inserts: self.inserts,
            refreshes: self.refreshes,
            scanned_at,
        }
    }
}

/// Runs user scans against the database.
///
/// Cloning is cheap; clones share the lock registry and the scan permits.
#[derive(Clone)]
pub struct SyncEngine {
    db: ArchiveDb,
    scanner: ArchiveScanner,
    locks: UserLocks,
    permits: Arc<Semaphore>,
    scan_timeout: Option<Duration>,
}

impl SyncEngine {
    pub fn new(db: ArchiveDb, source: Arc<dyn ArchiveSource>) -> Self {
        Self {
            db,
            scanner: ArchiveScanner::new(source),
            locks: UserLocks::new(),
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_SCANS)),
            scan_timeout: None,
        }
    }

    pub fn from_config(db: ArchiveDb, source: Arc<dyn ArchiveSource>, config: &ArchiveConfig) -> Self {
        Self::new(db, source)
            .with_max_concurrent_scans(config.max_concurrent_scans)
            .with_scan_timeout(config.scan_timeout())
    }

    pub fn with_max_concurrent_scans(mut self, max: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    pub fn with_scan_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.scan_timeout = timeout;
        self
    }

    pub fn db(&self) -> &ArchiveDb {
        &self.db
    }

    pub fn locks(&self) -> &UserLocks {
        &self.locks
    }

    /// Users currently present in the archive.
    pub async fn list_users(&self) -> Result<Vec<String>> {
        let scanner = self.scanner.clone();
        tokio::task::spawn_blocking(move || scanner.list_users())
            .await
            .map_err(|e| ScoutError::InvalidState(format!("User listing task failed: {}", e)))?
    }

    /// Sync one user.
    ///
    /// Fails immediately with [`ScoutError::ScanAlreadyInProgress`] if the
    /// user is already being scanned.
    pub async fn sync_user(&self, username: &str, mode: SyncMode) -> Result<SyncSummary> {
        // Reject before queueing for a slot; the lock itself is taken once a slot is held.
        if self.locks.is_locked(username) {
            return Err(ScoutError::ScanAlreadyInProgress(username.to_string()));
        }
        let never = CancellationToken::new();
        self.sync_user_unless_cancelled(username, mode, &never)
            .await?
            .ok_or_else(|| ScoutError::InvalidState("Scan cancelled".to_string()))
    }

    /// Sync every user in the archive, up to the concurrency limit at a time.
    ///
    /// Per-user failures are recorded in the report, never returned. Only a
    /// failure to list the archive root is an `Err`. Cancellation takes
    /// effect between user scans.
    pub async fn sync_all(&self, mode: SyncMode, cancel: &CancellationToken) -> Result<SweepReport> {
        let start = Instant::now();
        let users = self.list_users().await?;

        let mut report = SweepReport {
            users_found: users.len(),
            ..Default::default()
        };

        let mut tasks = JoinSet::new();
        let mut task_users: HashMap<task::Id, String> = HashMap::new();
        for username in users {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let engine = self.clone();
            let cancel = cancel.clone();
            let name = username.clone();
            let handle = tasks.spawn(async move {
                engine.sync_user_unless_cancelled(&name, mode, &cancel).await
            });
            task_users.insert(handle.id(), username);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => {
                    let username = task_users
                        .remove(&e.id())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    error!(username = %username, error = %e, "User scan task panicked");
                    report.record_failure(username, e.to_string());
                    continue;
                }
            };
            let username = task_users
                .remove(&id)
                .unwrap_or_else(|| "<unknown>".to_string());

            match result {
                Ok(Some(summary)) => report.record_success(username, summary),
                Ok(None) => {
                    debug!(username = %username, "Skipped after cancellation");
                    report.cancelled = true;
                }
                Err(e) if e.is_busy() => {
                    warn!(username = %username, "Scan already in progress, retrying next sweep");
                    report.users_busy += 1;
                }
                Err(e) => {
                    error!(username = %username, error = %e, "User scan failed");
                    report.record_failure(username, e.to_string());
                }
            }
        }

        report.finish();

        info!(
            users = report.users_found,
            succeeded = report.users_succeeded,
            failed = report.users_failed,
            busy = report.users_busy,
            cancelled = report.cancelled,
            inserted = report.totals.inserted,
            duration_ms = start.elapsed().as_millis() as u64,
            "Sweep complete"
        );

        Ok(report)
    }

    /// `Ok(None)` if `cancel` fired while waiting for a scan slot.
    ///
    /// The user lock is only taken once a slot is held, so users queued
    /// behind the concurrency limit stay available to manual scans.
    async fn sync_user_unless_cancelled(
        &self,
        username: &str,
        mode: SyncMode,
        cancel: &CancellationToken,
    ) -> Result<Option<SyncSummary>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ScoutError::InvalidState("Scan permits closed".to_string()))?;

        if cancel.is_cancelled() {
            return Ok(None);
        }

        let _lock = self.locks.try_acquire(username)?;

        let summary = match self.scan_timeout {
            Some(limit) => tokio::time::timeout(limit, self.scan_and_write(username, mode))
                .await
                .map_err(|_| ScoutError::Timeout {
                    username: username.to_string(),
                    secs: limit.as_secs(),
                })??,
            None => self.scan_and_write(username, mode).await?,
        };

        Ok(Some(summary))
    }

    /// Scan, diff, then commit everything in one transaction. Dropping this
    /// future (timeout) rolls the transaction back.
    async fn scan_and_write(&self, username: &str, mode: SyncMode) -> Result<SyncSummary> {
        let start = Instant::now();

        let scanner = self.scanner.clone();
        let name = username.to_string();
        let outcome = tokio::task::spawn_blocking(move || scanner.scan_user(&name))
            .await
            .map_err(|e| ScoutError::InvalidState(format!("Scan task failed: {}", e)))??;

        let plan = match mode {
            SyncMode::Incremental => {
                let stored = self.db.stored_media_counts(username).await?;
                SyncPlan::incremental(&outcome.posts, &stored)
            }
            SyncMode::Forced => SyncPlan::forced(&outcome.posts),
        };

        let planned_refreshes = plan.refreshes.len() as u64;
        let unchanged = plan.unchanged;
        let write = plan.into_write(username, outcome.latest_profile().cloned(), Utc::now());
        let stats = self.db.apply_sync_write(&write).await?;

        let summary = SyncSummary {
            inserted: stats.inserted,
            skipped: unchanged
                + stats.duplicates
                + planned_refreshes.saturating_sub(stats.media_refreshed),
            failed: outcome.failures.len() as u64,
            media_refreshed: stats.media_refreshed,
            deleted: stats.deleted,
        };

        info!(
            username,
            mode = ?mode,
            inserted = summary.inserted,
            skipped = summary.skipped,
            failed = summary.failed,
            media_refreshed = summary.media_refreshed,
            deleted = summary.deleted,
            duration_ms = start.elapsed().as_millis() as u64,
            "User synced"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_db::TimestampSource;
    use chrono::TimeZone;

    fn parsed(post_id: &str, media: &[&str]) -> ParsedPost {
        ParsedPost {
            post_id: post_id.to_string(),
            timestamp: Utc.timestamp_opt(1, 0).unwrap(),
            timestamp_source: TimestampSource::Metadata,
            text: String::new(),
            media: media.iter().map(|m| m.to_string()).collect(),
            engagement: Default::default(),
            raw_json: None,
            profile: None,
        }
    }

    #[test]
    fn test_incremental_plan_is_a_set_difference() {
        let posts = vec![
            parsed("1", &["1.jpg"]),
            parsed("2", &["2_1.jpg", "2_2.jpg"]),
            parsed("3", &[]),
        ];
        let stored: HashMap<String, usize> =
            [("1".to_string(), 1), ("2".to_string(), 1), ("99".to_string(), 4)]
                .into_iter()
                .collect();

        let plan = SyncPlan::incremental(&posts, &stored);

        assert_eq!(plan.mode, WriteMode::Incremental);
        let inserted: Vec<_> = plan.inserts.iter().map(|p| p.post_id.as_str()).collect();
        assert_eq!(inserted, vec!["3"]);
        assert_eq!(plan.refreshes.len(), 1);
        assert_eq!(plan.refreshes[0].post_id, "2");
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn test_shorter_media_list_is_not_a_refresh() {
        let posts = vec![parsed("1", &["1_1.jpg"])];
        let stored: HashMap<String, usize> = [("1".to_string(), 3)].into_iter().collect();

        let plan = SyncPlan::incremental(&posts, &stored);
        assert!(plan.refreshes.is_empty());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn test_forced_plan_inserts_everything() {
        let posts = vec![parsed("1", &[]), parsed("2", &[])];
        let plan = SyncPlan::forced(&posts);
        assert_eq!(plan.mode, WriteMode::Rebuild);
        assert_eq!(plan.inserts.len(), 2);
        assert!(plan.refreshes.is_empty());
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(SyncMode::from_force_flag(true), SyncMode::Forced);
        assert_eq!(SyncMode::from_force_flag(false), SyncMode::Incremental);
        assert_eq!(SyncMode::default(), SyncMode::Incremental);
    }
}
