//! Crawler module for walking the account/match graph
//!
//! This module contains the core crawling logic, including:
//! - Shared rate limiting and retry of transient failures
//! - Paginated match-list retrieval and at-most-once match fetching
//! - A bounded worker pool with cooperative cancellation
//! - Round-by-round crawl coordination

mod coordinator;
mod match_list;
mod matches;
mod pool;
mod rate_limiter;
mod retry;

pub use coordinator::{run_crawl, seed_set_hash, CrawlOptions, Crawler};
pub use match_list::MatchListFetcher;
pub use matches::{MatchBatch, MatchFetcher};
pub use pool::{stop_channel, PoolOutcome, StopHandle, StopSignal, WorkerPool};
pub use rate_limiter::RateLimiter;
pub use retry::{with_retry, RetryPolicy};

use crate::config::Config;
use crate::storage::FailedAccount;
use crate::SpiderError;

/// Summary of a finished (or stopped) crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub run_id: i64,
    /// Rounds fully completed by the run, including rounds before a resume
    pub rounds_completed: u32,
    /// Distinct accounts placed in any frontier of the run
    pub accounts_visited: u64,
    /// Match records fetched by this invocation
    pub matches_fetched: u64,
    /// Account match lists in the store at termination
    pub accounts_stored: u64,
    /// Match records in the store at termination
    pub matches_stored: u64,
    pub failed_accounts: Vec<FailedAccount>,
    pub failed_matches: u64,
    /// The crawl stopped on request before reaching its end
    pub interrupted: bool,
}

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Build the rate-limited HTTP client
/// 2. Open the store and load or create a crawl run
/// 3. Resolve the configured seeds
/// 4. Crawl for the configured degree
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl completed successfully
/// * `Err(SpiderError)` - Crawl failed
pub async fn crawl(config: Config) -> Result<CrawlReport, SpiderError> {
    run_crawl(config, false, StopSignal::never()).await
}
