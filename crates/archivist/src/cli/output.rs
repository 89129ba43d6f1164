//! Output formatting for CLI commands

use archivist_scout::SyncSummary;
use chrono::{DateTime, Local, Utc};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }

    println!("{}", table);
}

/// Local wall-clock time, minute precision
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_optional_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(format_timestamp).unwrap_or_else(|| "never".to_string())
}

/// First line of `text`, cut to `max_chars` with an ellipsis.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    let mut out: String = line.chars().take(max_chars).collect();
    if line.chars().count() > max_chars || text.lines().nth(1).is_some() {
        out.push('…');
    }
    out
}

/// Row for a per-user sync summary table
pub fn summary_row(username: &str, summary: &SyncSummary) -> Vec<String> {
    vec![
        username.to_string(),
        summary.inserted.to_string(),
        summary.skipped.to_string(),
        summary.failed.to_string(),
        summary.media_refreshed.to_string(),
        summary.deleted.to_string(),
    ]
}

pub const SUMMARY_HEADERS: &[&str] = &["User", "Inserted", "Skipped", "Failed", "Media refreshed", "Deleted"];
