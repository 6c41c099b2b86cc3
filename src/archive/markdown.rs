//! Markdown rendering of a single archived post.
//!
//! Rendering is pure: callers hand in the topic, the comments to append,
//! and whichever attachments actually made it to disk. Section headers are
//! driven by what the post declares; the references inside them by what
//! was downloaded, so a failed image download leaves a numbering gap
//! rather than a broken link.

use tracing::warn;

use crate::api::{Comment, Topic};
use crate::sanitize;
use crate::timefmt;

/// An image that made it to disk, ready to be referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    /// Path relative to the post file, e.g. `images/topic_1_image_1.jpg`.
    pub rel_path: String,
    /// 1-based position among the owner's declared images.
    pub position: usize,
}

/// Render the full Markdown body of one post.
///
/// `header_time` is the already-derived display timestamp (or the raw
/// string when it would not parse). `comment_images[i]` holds the saved
/// images of `comments[i]`.
#[must_use]
pub fn render_post(
    topic: &Topic,
    header_time: &str,
    comments: &[Comment],
    post_images: &[SavedImage],
    comment_images: &[Vec<SavedImage>],
) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {} 发表于 {header_time}\n\n", topic.author_name()));
    out.push_str(&format!("帖子ID: {}\n\n", topic.id_string()));

    let text = topic
        .content()
        .and_then(|content| content.text.as_deref())
        .unwrap_or_default();
    out.push_str(&format!("{}\n\n", sanitize::clean_embedded_tags(text)));

    let declares_images = topic
        .content()
        .and_then(|content| content.images.as_ref())
        .is_some_and(|images| !images.is_empty());
    if declares_images {
        out.push_str("## 图片\n\n");
        for image in post_images {
            out.push_str(&format!("![图片 {}]({})\n\n", image.position, image.rel_path));
        }
    }

    let files = topic
        .content()
        .and_then(|content| content.files.as_deref())
        .unwrap_or_default();
    if !files.is_empty() {
        out.push_str("## 文件\n\n");
        for (idx, file) in files.iter().enumerate() {
            if let Some(name) = file.name.as_deref() {
                out.push_str(&format!("文件 {}: {name}\n\n", idx + 1));
            }
        }
    }

    if !comments.is_empty() {
        out.push_str("## 评论\n\n");
        for (idx, comment) in comments.iter().enumerate() {
            render_comment(&mut out, comment, comment_images.get(idx));
        }
    }

    out
}

fn render_comment(out: &mut String, comment: &Comment, saved: Option<&Vec<SavedImage>>) {
    let author = comment.author_name();
    let time = display_or_raw(comment.create_time.as_deref());
    let text = sanitize::clean_embedded_tags(comment.text.as_deref().unwrap_or_default());
    match comment.reply_target() {
        Some(target) => {
            out.push_str(&format!("**{author}** 回复 **{target}** ({time}):\n\n{text}\n\n"));
        }
        None => out.push_str(&format!("**{author}** ({time}):\n\n{text}\n\n")),
    }
    if let Some(saved) = saved {
        for image in saved {
            out.push_str(&format!("![评论图片 {}]({})\n\n", image.position, image.rel_path));
        }
    }
    out.push_str("---\n\n");
}

fn display_or_raw(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    match timefmt::parse_api_time(raw) {
        Ok(time) => timefmt::display_time(&time),
        Err(e) => {
            warn!(create_time = raw, error = %e, "Unparseable comment timestamp, keeping it raw");
            raw.to_string()
        }
    }
}
