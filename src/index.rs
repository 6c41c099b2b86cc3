//! The persisted Markdown index of archived posts.
//!
//! `index.md` is a Markdown table, newest first: a title line naming the
//! group, a blank line, the fixed column-header and separator rows, then
//! one row per archived post. The filename inside the link cell is the
//! identity posts are deduplicated on across runs. The file is rewritten
//! atomically, and only when a run actually produced new entries.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::fs_utils::write_atomic;

/// Column-header row of the index table.
pub const TABLE_HEADER: &str = "| 发布时间 | 作者 | 帖子ID | 文件链接 |";

/// Separator row under the column header.
pub const TABLE_SEPARATOR: &str = "|---------|------|--------|----------|";

const INDEX_TITLE: &str = "知识星球帖子索引";

/// One row of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// `YYYY-MM-DD HH:MM:SS`; fixed width, so string order is time order.
    pub display_time: String,
    pub author: String,
    pub topic_id: String,
    /// Derived filename of the post; the dedup identity.
    pub filename: String,
}

impl IndexEntry {
    /// Render as a table row.
    #[must_use]
    pub fn to_row(&self) -> String {
        format!(
            "| {} | {} | {} | [{}]({}) |",
            self.display_time, self.author, self.topic_id, self.filename, self.filename
        )
    }
}

/// Parse one data row; `None` when the line is not a parseable entry.
fn parse_row(line: &str) -> Option<IndexEntry> {
    let parts: Vec<&str> = line.split('|').map(str::trim).collect();
    if parts.len() < 5 {
        return None;
    }
    let link_cell = parts[4];
    let open = link_cell.find('[')?;
    let close = link_cell[open + 1..].find(']')?;
    let filename = &link_cell[open + 1..open + 1 + close];
    if filename.is_empty() {
        return None;
    }
    Some(IndexEntry {
        display_time: parts[1].to_string(),
        author: parts[2].to_string(),
        topic_id: parts[3].to_string(),
        filename: filename.to_string(),
    })
}

/// Read every parseable entry from an existing index file.
///
/// A missing file is an empty index. Rows that fail to parse are logged
/// with their raw text and skipped; the next rewrite will drop them, so the
/// warning is the only trace they leave.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read.
pub fn load_entries(path: &Path) -> Result<Vec<IndexEntry>> {
    if !path.exists() {
        debug!(path = %path.display(), "No existing index");
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read index: {}", path.display()))?;

    let mut entries = Vec::new();
    let mut in_table = false;
    for line in raw.lines() {
        if line.contains("| 发布时间 |") {
            in_table = true;
            continue;
        }
        if !in_table || line.starts_with("|---") || !line.contains('|') {
            continue;
        }
        if !line.contains(".md") {
            continue;
        }
        match parse_row(line) {
            Some(entry) => entries.push(entry),
            None => warn!(line, "Skipping unparseable index row"),
        }
    }
    info!(entries = entries.len(), path = %path.display(), "Loaded existing index");
    Ok(entries)
}

/// The set of filenames already present, for dedup.
#[must_use]
pub fn known_filenames(entries: &[IndexEntry]) -> HashSet<String> {
    entries.iter().map(|entry| entry.filename.clone()).collect()
}

/// Merge existing and new entries into canonical order: union deduplicated
/// by filename with existing entries winning, stably sorted by descending
/// display time.
#[must_use]
pub fn merge_entries(existing: Vec<IndexEntry>, new: Vec<IndexEntry>) -> Vec<IndexEntry> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged: Vec<IndexEntry> = Vec::with_capacity(existing.len() + new.len());
    for entry in existing.into_iter().chain(new) {
        if seen.insert(entry.filename.clone()) {
            merged.push(entry);
        } else {
            debug!(filename = %entry.filename, "Dropping duplicate index entry");
        }
    }
    merged.sort_by(|a, b| b.display_time.cmp(&a.display_time));
    merged
}

/// Render the full index document.
#[must_use]
pub fn render_index(group_id: &str, entries: &[IndexEntry]) -> String {
    let mut out = format!("# {INDEX_TITLE} - {group_id}\n\n");
    out.push_str(TABLE_HEADER);
    out.push('\n');
    out.push_str(TABLE_SEPARATOR);
    out.push('\n');
    for entry in entries {
        out.push_str(&entry.to_row());
        out.push('\n');
    }
    out
}

/// Merge `new_entries` into the index at `path` and rewrite it atomically.
/// Returns how many entries were added.
///
/// When `new_entries` is empty the file is left completely untouched, not
/// even rewritten with a fresh header.
///
/// # Errors
///
/// Returns an error when the rewrite fails.
pub fn merge(
    path: &Path,
    group_id: &str,
    existing: Vec<IndexEntry>,
    new_entries: Vec<IndexEntry>,
) -> Result<usize> {
    if new_entries.is_empty() {
        info!("No new posts, index left untouched");
        return Ok(0);
    }
    let added = new_entries.len();
    let merged = merge_entries(existing, new_entries);
    write_atomic(path, &render_index(group_id, &merged))
        .with_context(|| format!("Failed to rewrite index: {}", path.display()))?;
    info!(added, total = merged.len(), path = %path.display(), "Index updated");
    Ok(added)
}
