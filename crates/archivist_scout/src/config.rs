//! Configuration for the archive engine

use crate::error::{Result, ScoutError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine configuration, loaded from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Directory holding one subdirectory per user
    #[serde(default = "default_root_data_folder")]
    pub root_data_folder: PathBuf,

    /// Path to the SQLite index
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Run the background scheduler
    #[serde(default = "default_auto_scan_enabled")]
    pub auto_scan_enabled: bool,

    /// Seconds between scheduled sweeps
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// Default mode for manual scans when no flag is given
    #[serde(default)]
    pub force_rescan: bool,

    /// Default page size for the query service
    #[serde(default = "default_posts_per_page")]
    pub posts_per_page: u64,

    /// Upper bound on user scans running at once
    #[serde(default = "default_max_concurrent_scans")]
    pub max_concurrent_scans: usize,

    /// Wall-clock limit per user scan; 0 disables it
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    /// Treat symlinked user directories and files like real ones
    #[serde(default = "default_follow_symlinks")]
    pub follow_symlinks: bool,
}

fn default_root_data_folder() -> PathBuf {
    PathBuf::from("archive")
}

fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".archivist").join("archivist.sqlite3"))
        .unwrap_or_else(|| PathBuf::from("archivist.sqlite3"))
}

fn default_auto_scan_enabled() -> bool {
    true
}

fn default_scan_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_posts_per_page() -> u64 {
    20
}

fn default_max_concurrent_scans() -> usize {
    4
}

fn default_scan_timeout_secs() -> u64 {
    600
}

fn default_follow_symlinks() -> bool {
    true
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root_data_folder: default_root_data_folder(),
            database_path: default_database_path(),
            auto_scan_enabled: default_auto_scan_enabled(),
            scan_interval_secs: default_scan_interval_secs(),
            force_rescan: false,
            posts_per_page: default_posts_per_page(),
            max_concurrent_scans: default_max_concurrent_scans(),
            scan_timeout_secs: default_scan_timeout_secs(),
            follow_symlinks: default_follow_symlinks(),
        }
    }
}

impl ArchiveConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ArchiveConfig =
            toml::from_str(&content).map_err(|e| ScoutError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ScoutError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_secs == 0 {
            return Err(ScoutError::Config(
                "scan_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.posts_per_page == 0 {
            return Err(ScoutError::Config(
                "posts_per_page must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_scans == 0 {
            return Err(ScoutError::Config(
                "max_concurrent_scans must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn scan_timeout(&self) -> Option<Duration> {
        (self.scan_timeout_secs > 0).then(|| Duration::from_secs(self.scan_timeout_secs))
    }
}
