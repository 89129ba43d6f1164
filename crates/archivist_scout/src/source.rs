//! Archive listing abstraction
//!
//! The scanner never touches `std::fs` directly; it goes through an
//! [`ArchiveSource`]. [`LocalArchive`] is the real directory tree,
//! [`MemoryArchive`] is an in-memory stand-in for tests.

use crate::error::{Result, ScoutError};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::warn;
use walkdir::WalkDir;

/// One file directly inside a user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// File name, relative to the user directory
    pub name: String,
    /// Modification time, if the filesystem reports one
    pub modified: Option<DateTime<Utc>>,
}

/// Read-only view of an archive: users, their files, and file contents.
pub trait ArchiveSource: Send + Sync {
    /// One username per immediate subdirectory of the root, hidden entries excluded.
    fn list_users(&self) -> Result<Vec<String>>;

    /// Files directly inside the user's directory.
    ///
    /// Fails with [`ScoutError::UnreadableDirectory`] if the directory itself
    /// cannot be listed. Individual entries that cannot be inspected are skipped.
    fn list_entries(&self, username: &str) -> Result<Vec<ArchiveEntry>>;

    /// Read one file of a user directory as UTF-8.
    fn read_to_string(&self, username: &str, name: &str) -> io::Result<String>;
}

pub(crate) fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Usernames become path components; reject anything that could escape the root.
pub(crate) fn validate_username(username: &str) -> Result<()> {
    let valid = !username.is_empty()
        && !is_hidden(username)
        && !username.contains(['/', '\\'])
        && username != "..";
    if valid {
        Ok(())
    } else {
        Err(ScoutError::InvalidState(format!(
            "Invalid username '{}'",
            username
        )))
    }
}

// ============================================================================
// Local filesystem
// ============================================================================

/// Archive rooted at a directory on the local filesystem.
///
/// Symlinked user directories and files are followed unless disabled with
/// [`LocalArchive::with_follow_symlinks`].
#[derive(Debug, Clone)]
pub struct LocalArchive {
    root: PathBuf,
    follow_symlinks: bool,
}

impl LocalArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_symlinks: true,
        }
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    fn walk(&self, dir: &Path) -> WalkDir {
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.follow_symlinks)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, username: &str) -> Result<PathBuf> {
        validate_username(username)?;
        Ok(self.root.join(username))
    }
}

impl ArchiveSource for LocalArchive {
    fn list_users(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(ScoutError::RootNotFound(self.root.clone()));
        }

        let mut users = Vec::new();
        for entry in self.walk(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    let path = self.root.clone();
                    return Err(match err.into_io_error() {
                        Some(io_err) => ScoutError::unreadable(path, io_err),
                        None => ScoutError::InvalidState(format!(
                            "Cannot list archive root {}",
                            path.display()
                        )),
                    });
                }
                Err(err) => {
                    warn!(error = %err, "Skipping unreadable archive entry");
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                warn!(path = %entry.path().display(), "Skipping non UTF-8 user directory");
                continue;
            };
            if is_hidden(name) {
                continue;
            }
            users.push(name.to_string());
        }

        users.sort();
        Ok(users)
    }

    fn list_entries(&self, username: &str) -> Result<Vec<ArchiveEntry>> {
        let dir = self.user_dir(username)?;

        let mut entries = Vec::new();
        for entry in self.walk(&dir) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(match err.into_io_error() {
                        Some(io_err) => ScoutError::unreadable(dir, io_err),
                        None => ScoutError::unreadable(
                            dir,
                            io::Error::new(io::ErrorKind::Other, "directory walk failed"),
                        ),
                    });
                }
                Err(err) => {
                    warn!(username, error = %err, "Skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if is_hidden(name) {
                continue;
            }

            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);

            entries.push(ArchiveEntry {
                name: name.to_string(),
                modified,
            });
        }

        Ok(entries)
    }

    fn read_to_string(&self, username: &str, name: &str) -> io::Result<String> {
        let dir = self
            .user_dir(username)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        std::fs::read_to_string(dir.join(name))
    }
}

// ============================================================================
// In-memory archive
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryFile {
    contents: Vec<u8>,
    modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<String, BTreeMap<String, MemoryFile>>,
    unreadable: HashSet<String>,
}

/// Archive held entirely in memory.
///
/// Mutations are visible to the next listing, so a test can change "disk"
/// between two scans.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    state: RwLock<MemoryState>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty user directory.
    pub fn add_user(&self, username: &str) {
        self.write_state()
            .users
            .entry(username.to_string())
            .or_default();
    }

    /// Add or replace a file, creating the user directory if needed.
    pub fn add_file(
        &self,
        username: &str,
        name: &str,
        contents: impl Into<Vec<u8>>,
        modified: Option<DateTime<Utc>>,
    ) {
        self.write_state()
            .users
            .entry(username.to_string())
            .or_default()
            .insert(
                name.to_string(),
                MemoryFile {
                    contents: contents.into(),
                    modified,
                },
            );
    }

    pub fn remove_file(&self, username: &str, name: &str) -> bool {
        self.write_state()
            .users
            .get_mut(username)
            .map(|files| files.remove(name).is_some())
            .unwrap_or(false)
    }

    /// Make listing this user's directory fail, as if permissions were revoked.
    pub fn set_unreadable(&self, username: &str, unreadable: bool) {
        let mut state = self.write_state();
        if unreadable {
            state.unreadable.insert(username.to_string());
        } else {
            state.unreadable.remove(username);
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl ArchiveSource for MemoryArchive {
    fn list_users(&self) -> Result<Vec<String>> {
        Ok(self
            .read_state()
            .users
            .keys()
            .filter(|name| !is_hidden(name))
            .cloned()
            .collect())
    }

    fn list_entries(&self, username: &str) -> Result<Vec<ArchiveEntry>> {
        validate_username(username)?;
        let state = self.read_state();
        let path = PathBuf::from(username);

        if state.unreadable.contains(username) {
            return Err(ScoutError::unreadable(
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
            ));
        }

        let files = state.users.get(username).ok_or_else(|| {
            ScoutError::unreadable(
                path,
                io::Error::new(io::ErrorKind::NotFound, "no such directory"),
            )
        })?;

        Ok(files
            .iter()
            .filter(|(name, _)| !is_hidden(name))
            .map(|(name, file)| ArchiveEntry {
                name: name.clone(),
                modified: file.modified,
            })
            .collect())
    }

    fn read_to_string(&self, username: &str, name: &str) -> io::Result<String> {
        let state = self.read_state();
        let file = state
            .users
            .get(username)
            .and_then(|files| files.get(name))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;
        String::from_utf8(file.contents.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
