//! Scan and sweep summaries.

use serde::Serialize;
use std::ops::AddAssign;

/// Counts for one user's sync.
///
/// `skipped` covers posts already stored (including inserts lost to a
/// concurrent writer); `failed` counts units the parser rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub inserted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub media_refreshed: u64,
    pub deleted: u64,
}

impl AddAssign for SyncSummary {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.media_refreshed += other.media_refreshed;
        self.deleted += other.deleted;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFailure {
    pub username: String,
    pub error: String,
}

/// Outcome of a sweep over every user in the archive.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub users_found: usize,
    pub users_succeeded: usize,
    pub users_failed: usize,
    /// Skipped because another scan held the user's lock
    pub users_busy: usize,
    /// True if the sweep stopped early; remaining users were not scanned
    pub cancelled: bool,
    pub totals: SyncSummary,
    /// Per-user results, ordered by username
    pub summaries: Vec<(String, SyncSummary)>,
    pub failures: Vec<UserFailure>,
}

impl SweepReport {
    pub fn has_failures(&self) -> bool {
        self.users_failed > 0
    }

    pub(crate) fn record_success(&mut self, username: String, summary: SyncSummary) {
        self.users_succeeded += 1;
        self.totals += summary;
        self.summaries.push((username, summary));
    }

    pub(crate) fn record_failure(&mut self, username: String, error: String) {
        self.users_failed += 1;
        self.failures.push(UserFailure { username, error });
    }

    pub(crate) fn finish(&mut self) {
        self.summaries.sort_by(|a, b| a.0.cmp(&b.0));
        self.failures.sort_by(|a, b| a.username.cmp(&b.username));
    }
}
