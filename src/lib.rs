//! Incremental archiver for ZSXQ (知识星球) group posts.
//!
//! Fetches posts newest-first through the paginated topics API, renders each
//! one to a Markdown file with its comments and images, and maintains a
//! Markdown index of everything archived so far. Runs are incremental: a
//! watermark from the previous run bounds the fetch window, and posts whose
//! derived filename is already known are never touched again.

pub mod api;
pub mod archive;
pub mod config;
pub mod constants;
pub mod fetch;
pub mod fs_utils;
pub mod index;
pub mod run_state;
pub mod sanitize;
pub mod timefmt;
