//! `list-posts`

use super::context::AppContext;
use super::output::{format_timestamp, print_table, truncate_text};
use super::CommandStatus;
use anyhow::Result;

const TEXT_PREVIEW_CHARS: usize = 60;

pub async fn list_posts(
    ctx: &AppContext,
    username: &str,
    page: u64,
    per_page: Option<u64>,
    json: bool,
) -> Result<CommandStatus> {
    let per_page = per_page.unwrap_or(ctx.query.page_size()).max(1);
    let page = page.max(1);
    let offset = (page - 1).saturating_mul(per_page);

    let result = ctx.query.list_posts(username, offset, per_page).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(CommandStatus::Success);
    }

    if result.posts.is_empty() {
        println!("No posts for '{}' on page {}.", username, page);
        return Ok(CommandStatus::Success);
    }

    let rows = result
        .posts
        .iter()
        .map(|p| {
            vec![
                p.post_id.clone(),
                format_timestamp(p.timestamp),
                p.media.len().to_string(),
                truncate_text(&p.text, TEXT_PREVIEW_CHARS),
            ]
        })
        .collect();
    print_table(&["Post", "Time", "Media", "Text"], rows);

    let pages = result.total.div_ceil(per_page).max(1);
    println!(
        "Page {} of {} ({} posts){}",
        page,
        pages,
        result.total,
        if result.has_more { ", more with --page" } else { "" }
    );

    Ok(CommandStatus::Success)
}
