//! HTTP client for the ZSXQ API.
//!
//! Every request carries the access-token cookie, a browser user agent and
//! a referer matching what the web client would send; the upstream rejects
//! requests without them. Page fetches retry on transport errors, bad
//! statuses and malformed payloads; everything else is a single attempt
//! that the caller degrades on.

use std::path::{Path, PathBuf};

use chrono::Utc;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::api::models::{Comment, CommentsPayload, Envelope, Topic, TopicsPayload};
use crate::api::retry::{RetryDecision, RetryPolicy};
use crate::config::Config;
use crate::constants::COMMENT_PAGE_SIZE;

/// Failure modes of a single API interaction.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure: connect, timeout, body read.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("unexpected status {0}")]
    Status(StatusCode),

    /// Body is not the JSON the endpoint documents.
    #[error("failed to parse response JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Body parsed but `resp_data` is missing: an API-level error reply.
    #[error("response missing resp_data (code {code:?}, msg {msg:?})")]
    MissingEnvelope {
        code: Option<i64>,
        msg: Option<String>,
    },

    /// Envelope present but the expected list is missing or empty.
    #[error("response missing or empty `{field}` list")]
    MissingList { field: &'static str },

    /// The whole retry budget was spent without a usable page.
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Writing a downloaded attachment to disk failed.
    #[error("failed to write downloaded file: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for the ZSXQ API, carrying auth material and the retry policy.
#[derive(Debug, Clone)]
pub struct ZsxqClient {
    http: reqwest::Client,
    api_base: String,
    group_id: String,
    access_token: String,
    user_agent: String,
    retry: RetryPolicy,
    response_dir: Option<PathBuf>,
}

impl ZsxqClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            group_id: config.group_id.clone(),
            access_token: config.access_token.clone(),
            user_agent: config.user_agent.clone(),
            retry: config.retry_policy(),
            response_dir: config.response_dir.clone(),
        })
    }

    fn cookie(&self) -> String {
        format!("zsxq_access_token={}", self.access_token)
    }

    fn group_referer(&self) -> String {
        format!("https://wx.zsxq.com/group/{}", self.group_id)
    }

    fn topic_referer(topic_id: u64) -> String {
        format!("https://wx.zsxq.com/dweb2/index/topic/{topic_id}")
    }

    /// Fetch one page of topics, newest first, strictly older than `cursor`.
    ///
    /// Transport errors, non-200 statuses and payloads without a non-empty
    /// topics list are all retried under the configured policy; the first
    /// attempt that yields topics wins.
    ///
    /// # Errors
    ///
    /// [`FetchError::RetriesExhausted`] once the budget is spent.
    pub async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Vec<Topic>, FetchError> {
        let mut failed_attempts = 0u32;
        loop {
            info!(
                attempt = failed_attempts + 1,
                count = page_size,
                cursor = cursor.unwrap_or("latest"),
                "Fetching topics page"
            );
            match self.try_fetch_page(cursor, page_size).await {
                Ok(topics) => {
                    debug!(topics = topics.len(), "Topics page fetched");
                    return Ok(topics);
                }
                Err(e) => {
                    warn!(attempt = failed_attempts + 1, error = %e, "Topics page fetch failed");
                    failed_attempts += 1;
                    match self.retry.decide(failed_attempts) {
                        RetryDecision::RetryAfter(delay) => tokio::time::sleep(delay).await,
                        RetryDecision::GiveUp => {
                            error!(attempts = failed_attempts, "Giving up on topics page");
                            return Err(FetchError::RetriesExhausted {
                                attempts: failed_attempts,
                            });
                        }
                    }
                }
            }
        }
    }

    async fn try_fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Vec<Topic>, FetchError> {
        let url = format!("{}/v2/groups/{}/topics", self.api_base, self.group_id);
        let mut request = self
            .http
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .header("Cookie", self.cookie())
            .header("Referer", self.group_referer())
            .query(&[("scope", "all".to_string()), ("count", page_size.to_string())]);
        if let Some(end_time) = cursor {
            request = request.query(&[("end_time", end_time)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = response.text().await?;
        self.dump_response("topics", &body).await;

        let envelope: Envelope<TopicsPayload> = serde_json::from_str(&body)?;
        let Envelope { code, msg, resp_data, .. } = envelope;
        let payload = resp_data.ok_or(FetchError::MissingEnvelope { code, msg })?;
        match payload.topics {
            Some(topics) if !topics.is_empty() => Ok(topics),
            _ => Err(FetchError::MissingList { field: "topics" }),
        }
    }

    /// Fetch the comments of one topic, oldest first, in a single page.
    ///
    /// A payload without a `comments` list simply means the topic has none.
    /// One attempt only: comment failures degrade at the call site instead
    /// of being retried.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a bad status, or an API-level
    /// error reply.
    pub async fn fetch_comments(&self, topic_id: u64) -> Result<Vec<Comment>, FetchError> {
        debug!(topic_id, "Fetching comments");
        let url = format!("{}/v2/topics/{topic_id}/comments", self.api_base);
        let response = self
            .http
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .header("Cookie", self.cookie())
            .header("Referer", Self::topic_referer(topic_id))
            .query(&[
                ("count", COMMENT_PAGE_SIZE.to_string()),
                ("sort", "asc".to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = response.text().await?;
        self.dump_response(&format!("comments_{topic_id}"), &body).await;

        let envelope: Envelope<CommentsPayload> = serde_json::from_str(&body)?;
        let Envelope { code, msg, resp_data, .. } = envelope;
        let payload = resp_data.ok_or(FetchError::MissingEnvelope { code, msg })?;
        Ok(payload.comments.unwrap_or_default())
    }

    /// Download a binary attachment to `dest`, with the same auth headers
    /// the API calls use.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a bad status, or when the
    /// bytes cannot be written to `dest`.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        debug!(url, dest = %dest.display(), "Downloading attachment");
        let response = self
            .http
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Cookie", self.cookie())
            .header("Referer", self.group_referer())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }

    /// Best-effort copy of a raw payload into the response dump directory.
    async fn dump_response(&self, label: &str, body: &str) {
        let Some(dir) = &self.response_dir else {
            return;
        };
        let stamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
        let path = dir.join(format!("zsxq_{label}_{stamp}.json"));
        if let Err(e) = tokio::fs::write(&path, body).await {
            warn!(path = %path.display(), error = %e, "Failed to dump API response");
        }
    }
}
