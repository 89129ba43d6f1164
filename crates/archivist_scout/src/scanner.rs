//! Archive scanner
//!
//! Lists users and turns one user directory into parsed posts. A pure read:
//! nothing here writes to disk or to the database, so scanning the same
//! directory twice gives the same outcome.

use crate::error::{ParseError, Result};
use crate::parser::{classify_entry, compare_post_ids, parse_unit, ContentUnit, ParsedPost};
use crate::source::{validate_username, ArchiveEntry, ArchiveSource};
use archivist_db::UserProfile;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A unit that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub post_id: String,
    pub error: ParseError,
}

/// Everything found in one user directory.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub posts: Vec<ParsedPost>,
    pub failures: Vec<UnitFailure>,
    /// Files that matched no unit pattern
    pub ignored_files: usize,
}

impl ScanOutcome {
    /// Profile from the newest post whose author is the directory's user.
    pub fn latest_profile(&self) -> Option<&UserProfile> {
        self.posts
            .iter()
            .filter(|p| p.profile.is_some())
            .max_by(|a, b| compare_post_ids(&a.post_id, &b.post_id))
            .and_then(|p| p.profile.as_ref())
    }
}

/// Bucket entries by post id. Every returned unit has at least one file.
pub fn group_units(entries: &[ArchiveEntry]) -> (Vec<ContentUnit>, usize) {
    let mut buckets: BTreeMap<String, ContentUnit> = BTreeMap::new();
    let mut ignored = 0;

    for entry in entries {
        match classify_entry(entry) {
            Some((post_id, file)) => {
                buckets
                    .entry(post_id.clone())
                    .or_insert_with(|| ContentUnit {
                        post_id,
                        files: Vec::new(),
                    })
                    .files
                    .push(file);
            }
            None => ignored += 1,
        }
    }

    (buckets.into_values().collect(), ignored)
}

/// Scanner over an [`ArchiveSource`].
#[derive(Clone)]
pub struct ArchiveScanner {
    source: Arc<dyn ArchiveSource>,
}

impl ArchiveScanner {
    pub fn new(source: Arc<dyn ArchiveSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<dyn ArchiveSource> {
        &self.source
    }

    pub fn list_users(&self) -> Result<Vec<String>> {
        self.source.list_users()
    }

    /// Parse every unit in a user's directory.
    ///
    /// Only a directory-level failure is an `Err`; per-unit parse errors are
    /// collected into [`ScanOutcome::failures`].
    pub fn scan_user(&self, username: &str) -> Result<ScanOutcome> {
        validate_username(username)?;
        let start = Instant::now();

        let entries = self.source.list_entries(username)?;
        let (units, ignored_files) = group_units(&entries);

        let mut outcome = ScanOutcome {
            ignored_files,
            ..Default::default()
        };

        for unit in &units {
            let read = |name: &str| self.source.read_to_string(username, name);
            match parse_unit(username, unit, read) {
                Ok(post) => {
                    if post.is_degraded() {
                        debug!(username, post_id = %post.post_id, "No metadata timestamp, using mtime");
                    }
                    outcome.posts.push(post);
                }
                Err(error) => {
                    warn!(username, post_id = %unit.post_id, error = %error, "Skipping unit");
                    outcome.failures.push(UnitFailure {
                        post_id: unit.post_id.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            username,
            files = entries.len(),
            posts = outcome.posts.len(),
            failed = outcome.failures.len(),
            ignored = outcome.ignored_files,
            duration_ms = start.elapsed().as_millis() as u64,
            "Scanned user directory"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoutError;
    use crate::source::MemoryArchive;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> Option<chrono::DateTime<Utc>> {
        Utc.timestamp_opt(secs, 0).single()
    }

    fn names(entries: &[&str]) -> Vec<ArchiveEntry> {
        entries
            .iter()
            .map(|n| ArchiveEntry {
                name: n.to_string(),
                modified: None,
            })
            .collect()
    }

    #[test]
    fn test_group_units_buckets_by_post_id() {
        let (units, ignored) = group_units(&names(&[
            "100_1.jpg",
            "100_2.jpg",
            "100.json",
            "101.jpg",
            "notes.md",
            "avatar.png",
        ]));
        assert_eq!(ignored, 2);
        assert_eq!(units.len(), 2);
        let unit_100 = units.iter().find(|u| u.post_id == "100").unwrap();
        assert_eq!(unit_100.files.len(), 3);
        assert!(units.iter().all(|u| !u.files.is_empty()));
    }

    #[test]
    fn test_scan_user_collects_failures_and_continues() {
        let archive = Arc::new(MemoryArchive::new());
        archive.add_file("alice", "1.jpg", "x", at(10));
        archive.add_file("alice", "2.jpg", "x", at(20));
        archive.add_file("alice", "2.json", "{broken", at(20));
        archive.add_file("alice", "3.json", r#"{"ts": 30, "text": "only text"}"#, at(30));

        let scanner = ArchiveScanner::new(archive);
        let outcome = scanner.scan_user("alice").unwrap();

        let mut ids: Vec<_> = outcome.posts.iter().map(|p| p.post_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].post_id, "2");
    }

    #[test]
    fn test_scan_is_repeatable() {
        let archive = Arc::new(MemoryArchive::new());
        archive.add_file("alice", "1_1.jpg", "x", at(10));
        archive.add_file("alice", "1_2.jpg", "x", at(10));

        let scanner = ArchiveScanner::new(archive);
        let first = scanner.scan_user("alice").unwrap();
        let second = scanner.scan_user("alice").unwrap();
        assert_eq!(first.posts, second.posts);
    }

    #[test]
    fn test_unreadable_directory_is_fatal() {
        let archive = Arc::new(MemoryArchive::new());
        archive.add_file("alice", "1.jpg", "x", at(10));
        archive.set_unreadable("alice", true);

        let scanner = ArchiveScanner::new(archive);
        assert!(matches!(
            scanner.scan_user("alice"),
            Err(ScoutError::UnreadableDirectory { .. })
        ));
    }

    #[test]
    fn test_latest_profile_uses_highest_post_id() {
        let archive = Arc::new(MemoryArchive::new());
        archive.add_file(
            "alice",
            "9.json",
            r#"{"ts": 1, "author": {"nick": "alice", "followers_count": 1}}"#,
            at(1),
        );
        archive.add_file(
            "alice",
            "10.json",
            r#"{"ts": 2, "author": {"nick": "alice", "followers_count": 2}}"#,
            at(2),
        );

        let outcome = ArchiveScanner::new(archive).scan_user("alice").unwrap();
        assert_eq!(outcome.latest_profile().unwrap().followers_count, Some(2));
    }
}
