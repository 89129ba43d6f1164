//! `scan-user` and `scan-all-users`

use super::context::AppContext;
use super::output::{print_table, summary_row, SUMMARY_HEADERS};
use super::CommandStatus;
use anyhow::Result;
use archivist_scout::{CancellationToken, ScoutError, SyncMode};
use tracing::{error, info, warn};

fn mode_for(ctx: &AppContext, force_rescan: bool) -> SyncMode {
    SyncMode::from_force_flag(force_rescan || ctx.config.force_rescan)
}

pub async fn scan_user(ctx: &AppContext, username: &str, force_rescan: bool) -> Result<CommandStatus> {
    let mode = mode_for(ctx, force_rescan);
    info!(username, mode = ?mode, "Scanning user");

    match ctx.engine.sync_user(username, mode).await {
        Ok(summary) => {
            print_table(SUMMARY_HEADERS, vec![summary_row(username, &summary)]);
            Ok(CommandStatus::Success)
        }
        Err(e @ ScoutError::ScanAlreadyInProgress(_)) => {
            warn!(username, "{}", e);
            eprintln!("{}", e);
            Ok(CommandStatus::Failed)
        }
        Err(e) => {
            error!(username, error = %e, "Scan failed");
            eprintln!("Scan of '{}' failed: {}", username, e);
            Ok(CommandStatus::Failed)
        }
    }
}

/// Ctrl-C cancels the sweep between user scans.
pub async fn scan_all_users(ctx: &AppContext, force_rescan: bool) -> Result<CommandStatus> {
    let mode = mode_for(ctx, force_rescan);
    info!(
        root = %ctx.config.root_data_folder.display(),
        mode = ?mode,
        "Scanning all users"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight user scans");
            on_signal.cancel();
        }
    });

    let result = ctx.engine.sync_all(mode, &cancel).await;
    signal_task.abort();
    let report = result?;

    let rows = report
        .summaries
        .iter()
        .map(|(username, summary)| summary_row(username, summary))
        .collect();
    print_table(SUMMARY_HEADERS, rows);

    println!(
        "{} users: {} synced, {} failed, {} busy{}",
        report.users_found,
        report.users_succeeded,
        report.users_failed,
        report.users_busy,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    for failure in &report.failures {
        eprintln!("  {}: {}", failure.username, failure.error);
    }

    Ok(if report.has_failures() {
        CommandStatus::Failed
    } else {
        CommandStatus::Success
    })
}
