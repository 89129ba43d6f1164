//! Configuration layering and shared handles for commands

use super::Cli;
use anyhow::{Context, Result};
use archivist_db::ArchiveDb;
use archivist_scout::{ArchiveConfig, LocalArchive, QueryService, SyncEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Config file, then `--root` / `--database` overrides.
///
/// Without `--config`, `$ARCHIVIST_HOME/config.toml` is used when it exists.
pub fn load_config(cli: &Cli) -> Result<ArchiveConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| Some(default_config_path()).filter(|p| p.exists()));

    let mut config = match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading config");
            ArchiveConfig::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => ArchiveConfig::default(),
    };

    if let Some(root) = &cli.root {
        config.root_data_folder = root.clone();
    }
    if let Some(database) = &cli.database {
        config.database_path = database.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub fn default_config_path() -> PathBuf {
    archivist_logging::archivist_home().join(DEFAULT_CONFIG_FILE)
}

/// Handles shared by every command.
pub struct AppContext {
    pub config: ArchiveConfig,
    pub engine: SyncEngine,
    pub query: QueryService,
}

impl AppContext {
    pub async fn open(config: ArchiveConfig) -> Result<Self> {
        let db = ArchiveDb::open(&config.database_path).await.with_context(|| {
            format!("Failed to open index at {}", config.database_path.display())
        })?;

        let source = Arc::new(
            LocalArchive::new(&config.root_data_folder)
                .with_follow_symlinks(config.follow_symlinks),
        );
        let engine = SyncEngine::from_config(db.clone(), source, &config);
        let query = QueryService::new(db, config.posts_per_page);

        Ok(Self {
            config,
            engine,
            query,
        })
    }

    pub async fn close(self) {
        self.engine.db().clone().close().await;
    }
}
