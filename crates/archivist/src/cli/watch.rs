//! `watch`: run the scheduler in the foreground

use super::context::AppContext;
use super::CommandStatus;
use anyhow::{Context, Result};
use archivist_scout::ScanScheduler;
use tracing::{info, warn};

pub async fn watch(ctx: &AppContext) -> Result<CommandStatus> {
    if !ctx.config.auto_scan_enabled {
        warn!("Automatic scanning is disabled (auto_scan_enabled = false)");
        println!("Automatic scanning is disabled in the configuration; nothing to do.");
        return Ok(CommandStatus::Success);
    }

    let scheduler = ScanScheduler::new(ctx.engine.clone(), ctx.config.scan_interval());
    scheduler.start()?;
    info!(
        root = %ctx.config.root_data_folder.display(),
        interval_secs = ctx.config.scan_interval_secs,
        "Watching archive, Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutdown requested, waiting for in-flight scans");
    scheduler.stop().await;

    let stats = scheduler.stats();
    info!(
        completed = stats.sweeps_completed,
        skipped = stats.sweeps_skipped,
        failed = stats.sweeps_failed,
        "Scheduler finished"
    );

    Ok(CommandStatus::Success)
}
