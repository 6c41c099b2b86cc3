//! Persistence of the last-run watermark.
//!
//! The watermark is a single ISO-8601 instant recorded at the start of every
//! run, before any fetching, and used as the default start bound of the next
//! run. A run that dies mid-fetch therefore still advances the watermark:
//! the tool prefers skipping a window over re-archiving one.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::fs_utils::write_atomic;

/// Load the previous run's watermark, if any.
///
/// A missing file means there was no previous run. Read failures and empty
/// files are logged and also yield `None`; the run then fetches without a
/// lower bound.
#[must_use]
pub fn load(path: &Path) -> Option<String> {
    if !path.exists() {
        info!(path = %path.display(), "No previous run state");
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let stamp = raw.trim();
            if stamp.is_empty() {
                warn!(path = %path.display(), "Run state file is empty, ignoring it");
                None
            } else {
                info!(last_run = stamp, "Loaded previous run state");
                Some(stamp.to_string())
            }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read run state, ignoring it");
            None
        }
    }
}

/// Record `now` as this run's watermark and return the written stamp.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn save(path: &Path, now: DateTime<Utc>) -> Result<String> {
    let stamp = now.to_rfc3339();
    write_atomic(path, &stamp)
        .with_context(|| format!("Failed to write run state: {}", path.display()))?;
    info!(run_time = %stamp, path = %path.display(), "Saved run watermark before fetching");
    Ok(stamp)
}
