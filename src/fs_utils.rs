use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::constants::{FILES_SUBDIR, IMAGES_SUBDIR};

/// Write `contents` to `path` atomically.
///
/// The bytes go to a temporary file in the destination directory first and
/// are renamed into place, so a failure mid-write never leaves a truncated
/// file behind.
///
/// # Errors
///
/// Returns an error when the temporary file cannot be created, written, or
/// renamed into place.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move temp file into place at {}", path.display()))?;
    Ok(())
}

/// Create the output directory with its `images/` and `files/` subdirectories.
///
/// # Errors
///
/// Returns an error when any of the directories cannot be created.
pub async fn ensure_corpus_layout(root: &Path) -> Result<()> {
    for dir in [root.to_path_buf(), root.join(IMAGES_SUBDIR), root.join(FILES_SUBDIR)] {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    Ok(())
}
