//! Archivist CLI
//!
//! Usage:
//!     archivist --root ~/archive scan-all-users [--force-rescan]
//!     archivist scan-user alice
//!     archivist list-posts alice --page 2
//!     archivist watch

use archivist::cli::{self, Cli, CommandStatus};
use archivist_logging::LogConfig;
use clap::Parser;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = archivist_logging::init_logging(LogConfig {
        app_name: "archivist",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        eprintln!("Warning: file logging unavailable: {:#}", err);
    }

    match cli::run(cli).await {
        Ok(CommandStatus::Success) => ExitCode::SUCCESS,
        Ok(CommandStatus::Failed) => ExitCode::from(1),
        Err(err) => {
            error!(error = %format!("{:#}", err), "Command failed");
            eprintln!("Error: {:#}", err);
            ExitCode::from(1)
        }
    }
}
