use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use zsxq_archiver::api::ZsxqClient;
use zsxq_archiver::archive;
use zsxq_archiver::config::Config;
use zsxq_archiver::constants::MAX_PAGE_SIZE;
use zsxq_archiver::fetch::{fetch_since, BatchPlan};
use zsxq_archiver::{fs_utils, index, run_state, timefmt};

/// Incrementally archive the posts of a ZSXQ group to a Markdown corpus.
#[derive(Debug, Parser)]
#[command(name = "zsxq-archiver", version, about)]
struct Cli {
    /// Only fetch posts created after this time (`YYYY-MM-DDTHH:MM:SSZ` or
    /// `YYYY-MM-DD`). Defaults to the previous run's watermark.
    #[arg(long = "start_time")]
    start_time: Option<String>,

    /// Maximum number of posts to consider this run.
    #[arg(long, default_value_t = 200)]
    total: u32,

    /// Posts requested per page.
    #[arg(long = "batch_size", default_value_t = 20)]
    batch_size: u32,

    /// Seconds to wait between page requests.
    #[arg(long, default_value_t = 2)]
    delay: u64,

    /// Ignore the previous run's watermark and fetch the full window.
    #[arg(long = "ignore_last_run")]
    ignore_last_run: bool,

    /// Re-run the tag sanitizer over the existing corpus, then exit.
    #[arg(long = "fix_tags")]
    fix_tags: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    init_tracing()?;

    let cli = Cli::parse();
    validate_batch_args(&cli)?;

    // Load and validate configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(
        group_id = %config.group_id,
        output = %config.output_dir.display(),
        "Configuration loaded"
    );

    fs_utils::ensure_corpus_layout(&config.output_dir).await?;
    if let Some(dir) = &config.response_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create response dump directory: {}", dir.display()))?;
    }

    if cli.fix_tags {
        let outcome = archive::fix_embedded_tags(&config.output_dir).await?;
        info!(rewritten = outcome.rewritten, "Tag repair finished");
        return Ok(());
    }

    // Resolve the default start bound from the previous run before the
    // watermark moves below.
    let start_raw = if cli.ignore_last_run {
        info!("Ignoring previous run state, fetching the full window");
        None
    } else {
        cli.start_time
            .clone()
            .or_else(|| run_state::load(&config.run_state_path))
    };

    // The watermark moves before any fetching: a run that dies mid-fetch
    // skips its window next time rather than re-archiving it.
    let run_stamp = match run_state::save(&config.run_state_path, Utc::now()) {
        Ok(stamp) => Some(stamp),
        Err(e) => {
            warn!(error = %e, "Failed to save run state, continuing without it");
            None
        }
    };

    let start_bound = start_raw.as_deref().and_then(|raw| {
        match timefmt::parse_start_bound(raw) {
            Ok(bound) => {
                info!(start_bound = %bound, "Only fetching posts newer than the start bound");
                Some(bound)
            }
            Err(e) => {
                warn!(start_time = raw, error = %e, "Unparseable start time, fetching everything");
                None
            }
        }
    });

    let client = ZsxqClient::new(&config).context("Failed to build API client")?;
    let plan = BatchPlan {
        total: cli.total,
        batch_size: cli.batch_size,
        delay: Duration::from_secs(cli.delay),
        start_bound,
    };

    let outcome = fetch_since(&client, &plan).await;
    if outcome.topics.is_empty() {
        info!(reason = %outcome.stop, "No posts in the window, nothing to archive");
        return Ok(());
    }

    let existing = index::load_entries(&config.index_path())
        .context("Failed to read the existing index")?;
    let known: HashSet<String> = index::known_filenames(&existing);

    let archived = archive::archive_topics(&client, &config, &outcome.topics, &known).await;
    if archived.failed > 0 {
        warn!(failed = archived.failed, "Some posts could not be archived");
    }
    let added = index::merge(
        &config.index_path(),
        &config.group_id,
        existing,
        archived.new_entries,
    )
    .unwrap_or_else(|e| {
        // The post files themselves are already on disk.
        tracing::error!(error = %e, "Failed to update the index");
        0
    });

    match run_stamp {
        Some(stamp) => info!(added, next_start = %stamp, "Run complete"),
        None => info!(added, "Run complete"),
    }
    Ok(())
}

fn validate_batch_args(cli: &Cli) -> Result<()> {
    if cli.batch_size == 0 {
        bail!("--batch_size must be at least 1");
    }
    if cli.batch_size > MAX_PAGE_SIZE {
        bail!("--batch_size must not exceed the API page maximum of {MAX_PAGE_SIZE}");
    }
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,zsxq_archiver=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        // Pretty-printed logging for development
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
