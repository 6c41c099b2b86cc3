use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::api::RetryPolicy;
use crate::constants::{DEFAULT_API_BASE, DEFAULT_USER_AGENT, FILES_SUBDIR, IMAGES_SUBDIR, INDEX_FILE_NAME};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Upstream API
    pub access_token: String,
    pub group_id: String,
    pub user_agent: String,
    pub api_base: String,

    // Local corpus
    pub output_dir: PathBuf,
    pub run_state_path: PathBuf,
    /// When set, every raw API payload is copied here for debugging.
    pub response_dir: Option<PathBuf>,

    // HTTP behavior
    pub http_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Upstream API
            access_token: required_env("ZSXQ_ACCESS_TOKEN")?,
            group_id: required_env("ZSXQ_GROUP_ID")?,
            user_agent: env_or_default("ZSXQ_USER_AGENT", DEFAULT_USER_AGENT),
            api_base: env_or_default("ZSXQ_API_BASE", DEFAULT_API_BASE),

            // Local corpus
            output_dir: PathBuf::from(env_or_default("OUTPUT_DIR", "./zsxq_posts")),
            run_state_path: PathBuf::from(env_or_default("RUN_STATE_PATH", "./lastrun.txt")),
            response_dir: optional_env("ZSXQ_RESPONSE_DIR").map(PathBuf::from),

            // HTTP behavior
            http_timeout: Duration::from_secs(parse_env_u64("HTTP_TIMEOUT_SECS", 30)?),
            max_retries: parse_env_u32("FETCH_MAX_RETRIES", 5)?,
            retry_delay: Duration::from_secs(parse_env_u64("FETCH_RETRY_DELAY_SECS", 3)?),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "ZSXQ_ACCESS_TOKEN".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.group_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "ZSXQ_GROUP_ID".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if url::Url::parse(&self.api_base).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "ZSXQ_API_BASE".to_string(),
                message: "must be a valid URL".to_string(),
            });
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "HTTP_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Retry budget applied around each page fetch.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
        }
    }

    /// Path of the Markdown index inside the output directory.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.output_dir.join(INDEX_FILE_NAME)
    }

    /// Directory for downloaded images.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.output_dir.join(IMAGES_SUBDIR)
    }

    /// Directory reserved for file attachments.
    #[must_use]
    pub fn files_dir(&self) -> PathBuf {
        self.output_dir.join(FILES_SUBDIR)
    }

    /// Configuration with dummy credentials and short delays, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            access_token: "test-token".to_string(),
            group_id: "481514".to_string(),
            user_agent: "zsxq-archiver-test".to_string(),
            api_base: "http://127.0.0.1:0".to_string(),
            output_dir: PathBuf::from("./test-output"),
            run_state_path: PathBuf::from("./test-lastrun.txt"),
            response_dir: None,
            http_timeout: Duration::from_secs(10),
            max_retries: 1,
            retry_delay: Duration::from_millis(10),
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
