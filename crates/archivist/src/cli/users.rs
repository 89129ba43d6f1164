//! `list-users`

use super::context::AppContext;
use super::output::{format_optional_timestamp, print_table};
use super::CommandStatus;
use anyhow::Result;

pub async fn list_users(ctx: &AppContext) -> Result<CommandStatus> {
    let users = ctx.query.list_users().await?;

    if users.is_empty() {
        println!("No users indexed yet. Run `archivist scan-all-users` first.");
        return Ok(CommandStatus::Success);
    }

    let rows = users
        .iter()
        .map(|u| {
            vec![
                u.username.clone(),
                u.name.clone().unwrap_or_default(),
                u.post_count.to_string(),
                format_optional_timestamp(u.last_scanned_at),
            ]
        })
        .collect();

    print_table(&["User", "Name", "Posts", "Last scanned"], rows);
    Ok(CommandStatus::Success)
}
