//! Free-text cleanup for post and comment bodies.
//!
//! ZSXQ embeds mentions, hashtags and links in body text as self-closing
//! `<e .../>` elements whose `title` attribute carries the percent-encoded
//! display text. Sanitizing replaces each element with the decoded title so
//! the Markdown reads as plain prose.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::warn;

static EMBEDDED_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<e[^>]*?title="([^"]*)"[^>]*?/>"#).unwrap());

static ILLEGAL_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());

/// Replace every `<e ... title="…" ... />` element with the percent-decoded
/// value of its `title` attribute.
///
/// Never fails: a title whose percent-encoding does not decode to valid
/// UTF-8 is logged and kept verbatim, and text without any such element
/// comes back unchanged.
#[must_use]
pub fn clean_embedded_tags(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    EMBEDDED_TAG
        .replace_all(text, |caps: &Captures<'_>| {
            let title = &caps[1];
            match urlencoding::decode(title) {
                Ok(decoded) => decoded.into_owned(),
                Err(e) => {
                    warn!(title, error = %e, "Undecodable tag title, keeping it raw");
                    title.to_string()
                }
            }
        })
        .into_owned()
}

/// Replace characters that are illegal in filenames with `_`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    ILLEGAL_FILENAME_CHARS.replace_all(name, "_").into_owned()
}
