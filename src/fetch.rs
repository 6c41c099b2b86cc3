//! Incremental batched fetch of topics.
//!
//! [`fetch_since`] drives repeated page requests, newest first, walking an
//! opaque time cursor backwards until the iteration budget is spent, the
//! upstream is drained, or the window of interest ends. Each page goes
//! through a pure fold step, so every stop condition is testable without a
//! network in play.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::{FetchError, Topic, ZsxqClient};
use crate::constants::SHORT_PAGE_LIMIT;
use crate::timefmt;

/// Where pages come from. The production implementation is [`ZsxqClient`];
/// tests script pages in memory.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page of topics strictly older than `cursor`.
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Vec<Topic>, FetchError>;
}

#[async_trait]
impl PageSource for ZsxqClient {
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Vec<Topic>, FetchError> {
        ZsxqClient::fetch_page(self, cursor, page_size).await
    }
}

/// Parameters of one incremental fetch.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// Maximum number of records ever considered; fixes the page budget
    /// up front.
    pub total: u32,
    /// Records requested per page.
    pub batch_size: u32,
    /// Pause between page requests.
    pub delay: Duration,
    /// Exclusive lower bound; records at or before it are discarded.
    pub start_bound: Option<DateTime<Utc>>,
}

impl BatchPlan {
    /// Number of pages the plan allows: `total / batch_size`, fixed before
    /// the first request. A total smaller than one page yields zero pages;
    /// so does a zero batch size, which the CLI rejects anyway.
    #[must_use]
    pub fn budget(&self) -> u32 {
        if self.batch_size == 0 {
            return 0;
        }
        self.total / self.batch_size
    }
}

/// Why the controller stopped requesting pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The fixed page budget was spent.
    BudgetSpent,
    /// The upstream returned an empty page.
    EmptyPage,
    /// A page fetch failed even after its own retry budget.
    FetchFailed,
    /// Three consecutive short pages; the upstream is drained.
    ShortPages,
    /// An entire page fell at or before the start bound.
    StartBoundReached,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::BudgetSpent => "page budget spent",
            Self::EmptyPage => "upstream returned an empty page",
            Self::FetchFailed => "page fetch failed",
            Self::ShortPages => "three consecutive short pages",
            Self::StartBoundReached => "reached the start bound",
        };
        f.write_str(reason)
    }
}

/// Result of a full [`fetch_since`] drive.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Kept records, newest first, in upstream page order.
    pub topics: Vec<Topic>,
    pub stop: StopReason,
    pub pages_fetched: u32,
}

/// Everything decided about one fetched page, before any of it is applied.
#[derive(Debug)]
pub(crate) struct PageAssessment {
    /// Records surviving the start-bound filter, page order preserved.
    pub kept: Vec<Topic>,
    /// Cursor for the next request: the raw creation time of the
    /// unfiltered page's last (oldest) record.
    pub next_cursor: Option<String>,
    /// Updated consecutive-short-page counter.
    pub consecutive_short: u32,
    /// Stop decision, when this page ends the run.
    pub stop: Option<StopReason>,
}

/// Pure fold step: classify one page against the plan.
///
/// The short-page counter is checked before the start-bound filter, so a
/// page that trips it contributes nothing. A page whose records all fall at
/// or before the bound ends the window, also contributing nothing. The
/// cursor always advances from the unfiltered page, keeping the walk moving
/// backwards even when everything on the page was filtered away.
pub(crate) fn assess_page(
    page: Vec<Topic>,
    batch_size: u32,
    start_bound: Option<&DateTime<Utc>>,
    consecutive_short: u32,
) -> PageAssessment {
    if page.is_empty() {
        return PageAssessment {
            kept: Vec::new(),
            next_cursor: None,
            consecutive_short,
            stop: Some(StopReason::EmptyPage),
        };
    }

    let consecutive_short = if (page.len() as u32) < batch_size {
        consecutive_short + 1
    } else {
        0
    };
    let next_cursor = page.last().and_then(|topic| topic.create_time.clone());

    if consecutive_short >= SHORT_PAGE_LIMIT {
        return PageAssessment {
            kept: Vec::new(),
            next_cursor,
            consecutive_short,
            stop: Some(StopReason::ShortPages),
        };
    }

    let (kept, stop) = match start_bound {
        Some(bound) => {
            let mut kept = Vec::with_capacity(page.len());
            for topic in page {
                if in_window(&topic, bound) {
                    kept.push(topic);
                }
            }
            if kept.is_empty() {
                (kept, Some(StopReason::StartBoundReached))
            } else {
                (kept, None)
            }
        }
        None => (page, None),
    };

    PageAssessment {
        kept,
        next_cursor,
        consecutive_short,
        stop,
    }
}

/// Whether a topic falls strictly after `bound`.
///
/// A topic whose timestamp is absent or unparseable counts as in-window:
/// losing a record is worse than re-examining one.
fn in_window(topic: &Topic, bound: &DateTime<Utc>) -> bool {
    let Some(raw) = topic.create_time.as_deref() else {
        warn!(topic_id = ?topic.topic_id, "Topic without create_time, keeping it");
        return true;
    };
    match timefmt::parse_api_time(raw) {
        Ok(created) => created.with_timezone(&Utc) > *bound,
        Err(e) => {
            warn!(
                topic_id = ?topic.topic_id,
                create_time = raw,
                error = %e,
                "Unparseable create_time, keeping the record"
            );
            true
        }
    }
}

/// Drive repeated page fetches according to `plan`, returning every kept
/// record plus why the run stopped.
///
/// Fetch failures never surface as errors here: a page that cannot be
/// fetched ends the run with whatever has been accumulated so far.
pub async fn fetch_since<S: PageSource>(source: &S, plan: &BatchPlan) -> FetchOutcome {
    let budget = plan.budget();
    info!(
        total = plan.total,
        batch_size = plan.batch_size,
        budget,
        start_bound = ?plan.start_bound,
        "Starting batched fetch"
    );

    let mut topics: Vec<Topic> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut consecutive_short = 0u32;
    let mut stop = StopReason::BudgetSpent;
    let mut pages_fetched = 0u32;

    for iteration in 0..budget {
        let page = match source.fetch_page(cursor.as_deref(), plan.batch_size).await {
            Ok(page) => page,
            Err(e) => {
                warn!(page = iteration + 1, error = %e, "Page fetch failed, stopping with partial results");
                stop = StopReason::FetchFailed;
                break;
            }
        };
        pages_fetched += 1;
        debug!(page = iteration + 1, of = budget, records = page.len(), "Fetched page");

        let assessment = assess_page(
            page,
            plan.batch_size,
            plan.start_bound.as_ref(),
            consecutive_short,
        );
        consecutive_short = assessment.consecutive_short;
        if let Some(next) = assessment.next_cursor {
            cursor = Some(next);
        }
        topics.extend(assessment.kept);

        if let Some(reason) = assessment.stop {
            info!(page = iteration + 1, reason = %reason, "Stopping batched fetch");
            stop = reason;
            break;
        }

        if iteration + 1 < budget {
            debug!(delay = ?plan.delay, "Waiting before the next page");
            tokio::time::sleep(plan.delay).await;
        }
    }

    info!(kept = topics.len(), pages = pages_fetched, reason = %stop, "Batched fetch finished");
    FetchOutcome {
        topics,
        stop,
        pages_fetched,
    }
}
