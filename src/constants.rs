/// User agent sent with every API and download request when
/// `ZSXQ_USER_AGENT` is not set. The upstream rejects obviously
/// non-browser clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Base URL of the upstream API when `ZSXQ_API_BASE` is not set.
pub const DEFAULT_API_BASE: &str = "https://api.zsxq.com";

/// Largest `count` the topics endpoint accepts per page.
pub const MAX_PAGE_SIZE: u32 = 30;

/// How many comments to request per topic (one page, oldest first).
pub const COMMENT_PAGE_SIZE: u32 = 100;

/// Consecutive short pages after which the upstream is considered drained.
pub const SHORT_PAGE_LIMIT: u32 = 3;

/// Name of the Markdown index file inside the output directory.
pub const INDEX_FILE_NAME: &str = "index.md";

/// Subdirectory of the output directory for downloaded images.
pub const IMAGES_SUBDIR: &str = "images";

/// Subdirectory of the output directory for file attachments.
///
/// Attachments are listed by name only and never downloaded, but the
/// directory is created alongside `images/` all the same.
pub const FILES_SUBDIR: &str = "files";

/// Author shown for a post whose owner is missing from the payload.
pub const UNKNOWN_AUTHOR: &str = "未知作者";

/// Author shown for a comment whose owner is missing from the payload.
pub const UNKNOWN_COMMENTER: &str = "未知用户";
