//! Command definitions and dispatch for the `archivist` binary

pub mod context;
pub mod output;
pub mod posts;
pub mod scan;
pub mod users;
pub mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use context::AppContext;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "archivist", about = "Index and browse a local social media archive")]
pub struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Path to a TOML config file (default: ~/.archivist/config.toml if present)
    #[arg(long, global = true, env = "ARCHIVIST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Archive root directory (one subdirectory per user)
    #[arg(long, global = true, env = "ARCHIVIST_ROOT")]
    pub root: Option<PathBuf>,

    /// Path to the SQLite index
    #[arg(long, global = true, env = "ARCHIVIST_DATABASE")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Sync every user directory in the archive
    ScanAllUsers {
        /// Drop stored posts and rebuild each user from disk
        #[arg(long)]
        force_rescan: bool,
    },

    /// Sync a single user directory
    ScanUser {
        username: String,

        /// Drop stored posts and rebuild from disk
        #[arg(long)]
        force_rescan: bool,
    },

    /// List indexed users
    ListUsers,

    /// Show one page of a user's posts, newest first
    ListPosts {
        username: String,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: u64,

        /// Posts per page (default: posts_per_page from config)
        #[arg(long)]
        per_page: Option<u64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the background scheduler until Ctrl-C
    Watch,
}

/// How a command finished, for the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// At least one user scan failed fatally
    Failed,
}

/// Load configuration, open the index and run the command.
pub async fn run(cli: Cli) -> Result<CommandStatus> {
    let config = context::load_config(&cli)?;
    let ctx = AppContext::open(config).await?;

    let status = match cli.command {
        Commands::ScanAllUsers { force_rescan } => scan::scan_all_users(&ctx, force_rescan).await?,
        Commands::ScanUser {
            username,
            force_rescan,
        } => scan::scan_user(&ctx, &username, force_rescan).await?,
        Commands::ListUsers => users::list_users(&ctx).await?,
        Commands::ListPosts {
            username,
            page,
            per_page,
            json,
        } => posts::list_posts(&ctx, &username, page, per_page, json).await?,
        Commands::Watch => watch::watch(&ctx).await?,
    };

    ctx.close().await;
    Ok(status)
}
