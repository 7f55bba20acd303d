//! Paginated fetch client
//!
//! Pages through one remote dataset, retrying rate limits and timeouts and
//! giving up on anything else. Whatever has been accumulated when the fetch
//! stops is always returned; errors never escape [`FetchClient::fetch_all`].
//!
//! Each page runs through a small state machine:
//!
//! ```text
//! Idle -> Attempting -> Success      -> (cooldown if retried) -> next page / done
//!                    -> RateLimited  -> backoff base * 2^(n-1) -> Attempting
//!                    -> TimedOut     -> flat delay             -> Attempting
//!                    -> HardFailure  -> stop, return accumulated records
//! ```
//!
//! The retry counter belongs to the page and starts at zero for every page.
//! Running out of retries also stops the fetch with the records so far.

use sgcol_common::{format::group_thousands, Record, ResourceId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::transport::PageTransport;
use super::types::Page;
use crate::clock::Sleeper;
use crate::config::FetchPolicy;
use crate::error::FetchError;

/// States of a single page request
#[derive(Debug)]
enum PageState {
    Idle,
    Attempting,
    Success(Page),
    RateLimited,
    TimedOut(String),
    HardFailure(FetchError),
}

/// How a page ended
#[derive(Debug)]
enum PageOutcome {
    Fetched { page: Page, retries: u32 },
    Exhausted { retries: u32 },
    Failed(FetchError),
}

/// Why a fetch stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStop {
    /// `offset >= total` was reached
    Completed,
    /// The fetch ended early; the records returned are a prefix of the dataset
    Partial(FetchError),
}

/// Everything accumulated for one resource
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub records: Vec<Record>,
    pub pages: u32,
    /// Last `total` reported by the remote, if any page succeeded
    pub last_total: Option<u64>,
    pub stop: FetchStop,
}

impl FetchOutcome {
    pub fn is_complete(&self) -> bool {
        self.stop == FetchStop::Completed
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Wait to apply before re-attempting a page, or `None` when the budget is spent.
///
/// `retries` is the page's retry count including the failure being handled.
fn retry_delay(policy: &FetchPolicy, failure: &FetchError, retries: u32) -> Option<Duration> {
    if !failure.is_retryable() || retries >= policy.max_retries {
        return None;
    }

    match failure {
        FetchError::RateLimited => Some(policy.backoff_for(retries)),
        _ => Some(policy.timeout_delay),
    }
}

/// Drives a full paginated extraction against a [`PageTransport`]
#[derive(Clone)]
pub struct FetchClient {
    transport: Arc<dyn PageTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: FetchPolicy,
}

impl FetchClient {
    pub fn new(
        transport: Arc<dyn PageTransport>,
        sleeper: Arc<dyn Sleeper>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    /// Fetch every page of `resource_id`.
    ///
    /// Never fails: a rate-limit budget running out, a transport error or a
    /// malformed response ends the fetch and the records gathered so far are
    /// returned with [`FetchStop::Partial`].
    pub async fn fetch_all(&self, resource_id: &ResourceId, label: &str) -> FetchOutcome {
        let page_size = u64::from(self.policy.page_size);
        let mut records: Vec<Record> = Vec::new();
        let mut offset: u64 = 0;
        let mut pages: u32 = 0;
        let mut last_total = None;

        info!(dataset = label, resource_id = %resource_id, "Starting extraction: {}", label);

        let stop = loop {
            match self.fetch_page(resource_id, label, offset).await {
                PageOutcome::Fetched { page, retries } => {
                    let total = page.total;
                    records.extend(page.records);
                    pages += 1;
                    last_total = Some(total);

                    info!(
                        dataset = label,
                        "Fetched {} / {} records (offset={})",
                        group_thousands(records.len() as u64),
                        group_thousands(total),
                        offset
                    );

                    if retries > 0 {
                        info!(
                            dataset = label,
                            retries,
                            "Cooling down for {}s after retry recovery",
                            self.policy.cooldown.as_secs()
                        );
                        self.sleeper.sleep(self.policy.cooldown).await;
                    }

                    offset += page_size;
                    if offset >= total {
                        break FetchStop::Completed;
                    }

                    self.sleeper.sleep(self.policy.inter_request_delay).await;
                },
                PageOutcome::Exhausted { retries } => {
                    error!(
                        dataset = label,
                        retries,
                        "Max retries reached for {} at offset {}. Returning {} records fetched so far",
                        label,
                        offset,
                        group_thousands(records.len() as u64)
                    );
                    break FetchStop::Partial(FetchError::RetryBudgetExhausted {
                        max_retries: self.policy.max_retries,
                        offset,
                    });
                },
                PageOutcome::Failed(err) => {
                    error!(
                        dataset = label,
                        error = %err,
                        "Request failed for {} at offset {}. Returning {} records fetched so far",
                        label,
                        offset,
                        group_thousands(records.len() as u64)
                    );
                    break FetchStop::Partial(err);
                },
            }
        };

        info!(
            dataset = label,
            pages,
            complete = stop == FetchStop::Completed,
            "Extraction completed: {} {} total records",
            label,
            group_thousands(records.len() as u64)
        );

        FetchOutcome {
            records,
            pages,
            last_total,
            stop,
        }
    }

    /// Run one page through the retry state machine
    async fn fetch_page(&self, resource_id: &ResourceId, label: &str, offset: u64) -> PageOutcome {
        let mut retries: u32 = 0;
        let mut state = PageState::Idle;

        loop {
            state = match state {
                PageState::Idle => PageState::Attempting,
                PageState::Attempting => {
                    match self
                        .transport
                        .fetch_page(resource_id, offset, self.policy.page_size)
                        .await
                    {
                        Ok(page) => PageState::Success(page),
                        Err(FetchError::RateLimited) => PageState::RateLimited,
                        Err(FetchError::Timeout(reason)) => PageState::TimedOut(reason),
                        Err(err) => PageState::HardFailure(err),
                    }
                },
                PageState::RateLimited => {
                    retries += 1;
                    let Some(wait) = retry_delay(&self.policy, &FetchError::RateLimited, retries)
                    else {
                        return PageOutcome::Exhausted { retries };
                    };
                    warn!(
                        dataset = label,
                        "Rate limited on {}. Retry {}/{} in {}s",
                        label,
                        retries,
                        self.policy.max_retries,
                        wait.as_secs()
                    );
                    self.sleeper.sleep(wait).await;
                    PageState::Attempting
                },
                PageState::TimedOut(reason) => {
                    retries += 1;
                    let timeout = FetchError::Timeout(reason);
                    let Some(wait) = retry_delay(&self.policy, &timeout, retries) else {
                        return PageOutcome::Exhausted { retries };
                    };
                    warn!(
                        dataset = label,
                        error = %timeout,
                        "Timeout on {} at offset {}. Retry {}/{} in {}s",
                        label,
                        offset,
                        retries,
                        self.policy.max_retries,
                        wait.as_secs()
                    );
                    self.sleeper.sleep(wait).await;
                    PageState::Attempting
                },
                PageState::Success(page) => return PageOutcome::Fetched { page, retries },
                PageState::HardFailure(err) => return PageOutcome::Failed(err),
            };
        }
    }
}
