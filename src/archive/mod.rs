pub mod markdown;

pub use markdown::{render_post, SavedImage};

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::api::{Comment, Topic, ZsxqClient};
use crate::config::Config;
use crate::constants::IMAGES_SUBDIR;
use crate::fs_utils;
use crate::index::IndexEntry;
use crate::sanitize;
use crate::timefmt;

/// Naming derived from a topic; the filename is the cross-run identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedNames {
    /// `YYYY-MM-DD HH:MM:SS`, or the raw timestamp when it would not parse.
    pub display_time: String,
    pub author: String,
    /// `<time>_<sanitized author>.md`.
    pub filename: String,
}

/// Derive display time, author and filename for a topic.
///
/// For any parseable timestamp the same (timestamp, author) pair always
/// yields the same filename. An unparseable timestamp keeps the raw string
/// for display and falls back to the current instant for the filename part.
#[must_use]
pub fn derive_names(topic: &Topic) -> DerivedNames {
    let author = topic.author_name().to_string();
    let safe_author = sanitize::sanitize_filename(&author);
    let raw = topic.create_time.as_deref().unwrap_or_default();
    let (display_time, file_time) = match timefmt::parse_api_time(raw) {
        Ok(time) => (timefmt::display_time(&time), timefmt::filename_time(&time)),
        Err(e) => {
            error!(topic_id = ?topic.topic_id, create_time = raw, error = %e, "Unparseable topic timestamp");
            (raw.to_string(), timefmt::filename_time_now())
        }
    };
    DerivedNames {
        display_time,
        author,
        filename: format!("{file_time}_{safe_author}.md"),
    }
}

/// Tally of one archiving pass.
#[derive(Debug, Default)]
pub struct ArchiveOutcome {
    /// Index entries for the posts newly written this run.
    pub new_entries: Vec<IndexEntry>,
    /// Posts skipped because their filename was already known.
    pub skipped: usize,
    /// Posts that failed to render or write.
    pub failed: usize,
}

/// Archive every topic that is not already in the corpus.
///
/// `known` holds the filenames present in the index; a post is also skipped
/// when its file already exists on disk, so nothing archived once is ever
/// regenerated. Failures are per-post: a post that cannot be rendered or
/// written is logged and skipped, and the run carries on with the next one.
pub async fn archive_topics(
    client: &ZsxqClient,
    config: &Config,
    topics: &[Topic],
    known: &HashSet<String>,
) -> ArchiveOutcome {
    let mut outcome = ArchiveOutcome::default();
    info!(topics = topics.len(), "Archiving fetched posts");

    for topic in topics {
        if topic.content().is_none() {
            warn!(topic_id = ?topic.topic_id, kind = ?topic.kind, "Topic has no content, skipping");
            continue;
        }
        let names = derive_names(topic);
        let post_path = config.output_dir.join(&names.filename);
        if known.contains(&names.filename) || post_path.exists() {
            debug!(filename = %names.filename, "Already archived, skipping");
            outcome.skipped += 1;
            continue;
        }
        match archive_one(client, config, topic, &names, &post_path).await {
            Ok(()) => {
                info!(filename = %names.filename, "Archived post");
                outcome.new_entries.push(IndexEntry {
                    display_time: names.display_time,
                    author: names.author,
                    topic_id: topic.id_string(),
                    filename: names.filename,
                });
            }
            Err(e) => {
                error!(filename = %names.filename, error = %e, "Failed to archive post");
                outcome.failed += 1;
            }
        }
    }

    info!(
        new = outcome.new_entries.len(),
        skipped = outcome.skipped,
        failed = outcome.failed,
        "Archiving pass finished"
    );
    outcome
}

async fn archive_one(
    client: &ZsxqClient,
    config: &Config,
    topic: &Topic,
    names: &DerivedNames,
    post_path: &Path,
) -> Result<()> {
    let comments = fetch_comments_with_fallback(client, topic).await;
    let post_images = download_post_images(client, config, topic).await;
    let comment_images = download_comment_images(client, config, &comments).await;
    let body = markdown::render_post(topic, &names.display_time, &comments, &post_images, &comment_images);
    fs_utils::write_atomic(post_path, &body)
        .with_context(|| format!("Failed to write post file: {}", post_path.display()))
}

/// Comments from the API, falling back to the listing's embedded
/// `show_comments` when the endpoint yields nothing.
async fn fetch_comments_with_fallback(client: &ZsxqClient, topic: &Topic) -> Vec<Comment> {
    let from_api = match topic.topic_id {
        Some(id) => match client.fetch_comments(id).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!(topic_id = id, error = %e, "Comment fetch failed, falling back to embedded comments");
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    if !from_api.is_empty() {
        return from_api;
    }
    topic.show_comments.clone().unwrap_or_default()
}

async fn download_post_images(
    client: &ZsxqClient,
    config: &Config,
    topic: &Topic,
) -> Vec<SavedImage> {
    let Some(images) = topic.content().and_then(|content| content.images.as_ref()) else {
        return Vec::new();
    };
    let topic_id = topic.id_string();
    let mut saved = Vec::new();
    for (idx, image) in images.iter().enumerate() {
        let Some(url) = image.post_url() else { continue };
        let name = format!("topic_{topic_id}_image_{}.jpg", idx + 1);
        if let Some(image) = download_image(client, config, url, &name, idx + 1).await {
            saved.push(image);
        }
    }
    saved
}

async fn download_comment_images(
    client: &ZsxqClient,
    config: &Config,
    comments: &[Comment],
) -> Vec<Vec<SavedImage>> {
    let mut all = Vec::with_capacity(comments.len());
    for comment in comments {
        let mut saved = Vec::new();
        if let Some(images) = comment.images.as_ref() {
            let comment_id = comment.id_string();
            for (idx, image) in images.iter().enumerate() {
                let Some(url) = image.comment_url() else { continue };
                let name = format!("comment_{comment_id}_image_{}.jpg", idx + 1);
                if let Some(image) = download_image(client, config, url, &name, idx + 1).await {
                    saved.push(image);
                }
            }
        }
        all.push(saved);
    }
    all
}

/// Download one image; a failure drops the reference, never the post.
async fn download_image(
    client: &ZsxqClient,
    config: &Config,
    url: &str,
    name: &str,
    position: usize,
) -> Option<SavedImage> {
    let dest = config.images_dir().join(name);
    match client.download(url, &dest).await {
        Ok(()) => Some(SavedImage {
            rel_path: format!("{IMAGES_SUBDIR}/{name}"),
            position,
        }),
        Err(e) => {
            warn!(url, error = %e, "Image download failed, dropping the reference");
            None
        }
    }
}

/// Tally of one tag-repair pass.
#[derive(Debug, Default)]
pub struct FixTagsOutcome {
    pub scanned: usize,
    pub rewritten: usize,
    pub failed: usize,
}

/// Re-run the sanitizer over every Markdown file already in the corpus.
///
/// Posts archived by older versions can still contain raw `<e/>` markup;
/// files without any marker are left untouched.
///
/// # Errors
///
/// Returns an error when the corpus directory itself cannot be listed;
/// per-file failures are logged and counted instead.
pub async fn fix_embedded_tags(output_dir: &Path) -> Result<FixTagsOutcome> {
    let mut outcome = FixTagsOutcome::default();
    let mut entries = tokio::fs::read_dir(output_dir)
        .await
        .with_context(|| format!("Failed to read corpus directory: {}", output_dir.display()))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Failed to list corpus directory: {}", output_dir.display()))?
    {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
            continue;
        }
        outcome.scanned += 1;
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable file, skipping");
                outcome.failed += 1;
                continue;
            }
        };
        if !contents.contains("<e ") {
            continue;
        }
        let cleaned = sanitize::clean_embedded_tags(&contents);
        match fs_utils::write_atomic(&path, &cleaned) {
            Ok(()) => {
                info!(path = %path.display(), "Rewrote file with embedded tags");
                outcome.rewritten += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to rewrite file");
                outcome.failed += 1;
            }
        }
    }

    info!(
        scanned = outcome.scanned,
        rewritten = outcome.rewritten,
        failed = outcome.failed,
        "Tag repair pass finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Owner, TopicContent};

    fn topic_by(author: &str, create_time: &str) -> Topic {
        Topic {
            topic_id: Some(581_234),
            create_time: Some(create_time.to_string()),
            kind: Some("talk".to_string()),
            talk: Some(TopicContent {
                owner: Some(Owner {
                    name: Some(author.to_string()),
                }),
                text: Some("正文".to_string()),
                images: None,
                files: None,
            }),
            question: None,
            show_comments: None,
        }
    }

    #[test]
    fn test_derive_names_is_deterministic() {
        let topic = topic_by("张三", "2024-01-15T10:30:00.123+0800");
        assert_eq!(derive_names(&topic), derive_names(&topic));
    }

    #[test]
    fn test_derive_names_shape() {
        let names = derive_names(&topic_by("张三", "2024-01-15T10:30:00.123+0800"));
        assert_eq!(names.display_time, "2024-01-15 10:30:00");
        assert_eq!(names.author, "张三");
        assert_eq!(names.filename, "2024-01-15_10-30-00_张三.md");
    }

    #[test]
    fn test_derive_names_sanitizes_author() {
        let names = derive_names(&topic_by("a/b:c", "2024-01-15T10:30:00.123+0800"));
        assert_eq!(names.filename, "2024-01-15_10-30-00_a_b_c.md");
        // The display column keeps the original name.
        assert_eq!(names.author, "a/b:c");
    }

    #[test]
    fn test_derive_names_unparseable_time_keeps_raw_display() {
        let names = derive_names(&topic_by("张三", "someday"));
        assert_eq!(names.display_time, "someday");
        assert!(names.filename.ends_with("_张三.md"));
    }

    #[tokio::test]
    async fn test_fix_embedded_tags_rewrites_only_marked_files() {
        let dir = tempfile::tempdir().unwrap();
        let marked = dir.path().join("a.md");
        let clean = dir.path().join("b.md");
        let other = dir.path().join("c.txt");
        std::fs::write(&marked, r#"前文 <e type="web" title="%E9%93%BE%E6%8E%A5" href="h" /> 后文"#).unwrap();
        std::fs::write(&clean, "已经干净").unwrap();
        std::fs::write(&other, r#"<e type="web" title="x" />"#).unwrap();

        let outcome = fix_embedded_tags(dir.path()).await.unwrap();
        assert_eq!(outcome.scanned, 2);
        assert_eq!(outcome.rewritten, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(std::fs::read_to_string(&marked).unwrap(), "前文 链接 后文");
        assert_eq!(std::fs::read_to_string(&clean).unwrap(), "已经干净");
    }

    #[tokio::test]
    async fn test_fix_embedded_tags_missing_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(fix_embedded_tags(&dir.path().join("nope")).await.is_err());
    }
}
