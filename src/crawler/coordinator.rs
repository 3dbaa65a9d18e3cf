//! Crawler coordinator - round-by-round crawl orchestration
//!
//! This module contains the crawl loop that coordinates:
//! - Creating or resuming a run in the store
//! - Dispatching one crawl unit per frontier account to the worker pool
//! - Accumulating newly discovered accounts across a round
//! - Computing the next frontier at each round boundary
//! - Handling interrupts and building the final report

use crate::api::{AccountId, HttpApiClient, MatchListQuery, RemoteApi};
use crate::config::Config;
use crate::crawler::match_list::MatchListFetcher;
use crate::crawler::matches::MatchFetcher;
use crate::crawler::pool::{StopSignal, WorkerPool};
use crate::crawler::rate_limiter::RateLimiter;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::CrawlReport;
use crate::storage::{open_store, FailedAccount, RunStatus, StorageError, Store};
use crate::{SpiderError, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Tunables for a crawl, usually taken from `[crawler]` and `[api]`
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub workers: usize,
    pub retry: RetryPolicy,
    pub max_pages: u32,
    pub query: MatchListQuery,
    /// Pick up the latest interrupted run for the same seeds and degree
    pub resume: bool,
}

impl CrawlOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.crawler.effective_workers(),
            retry: RetryPolicy::from_config(&config.crawler),
            max_pages: config.crawler.max_pages,
            query: MatchListQuery {
                queue: config.api.queue,
                season: config.api.season,
            },
            resume: true,
        }
    }
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryPolicy::default(),
            max_pages: 100,
            query: MatchListQuery::default(),
            resume: true,
        }
    }
}

/// Orchestrates a bounded-degree crawl over the account/match graph
pub struct Crawler {
    store: Arc<dyn Store>,
    list_fetcher: Arc<MatchListFetcher>,
    match_fetcher: Arc<MatchFetcher>,
    options: CrawlOptions,
    stop: StopSignal,
}

/// Orchestrator-owned state of the round in progress
struct RoundState {
    run_id: i64,
    round: u32,
    frontier: Vec<AccountId>,
    visited: HashSet<AccountId>,
    discovered: HashSet<AccountId>,
}

/// Totals gathered over the rounds run by this invocation
#[derive(Debug, Default)]
struct Progress {
    rounds_completed: u32,
    matches_fetched: u64,
    failed_matches: u64,
    interrupted: bool,
}

/// What a single crawl unit reports back to the orchestrator
#[derive(Debug)]
struct UnitOutcome {
    new_matches: usize,
    failed_matches: usize,
    interrupted: bool,
}

/// Everything a crawl unit needs, cloned into each spawned task
#[derive(Clone)]
struct CrawlUnit {
    store: Arc<dyn Store>,
    list_fetcher: Arc<MatchListFetcher>,
    match_fetcher: Arc<MatchFetcher>,
    discovered: Arc<Mutex<HashSet<AccountId>>>,
    stop: StopSignal,
    run_id: i64,
    round: u32,
    expand: bool,
}

impl Crawler {
    /// Creates a crawler over a remote API and a store
    pub fn new(api: Arc<dyn RemoteApi>, store: Arc<dyn Store>, options: CrawlOptions) -> Self {
        let list_fetcher = Arc::new(MatchListFetcher::new(
            Arc::clone(&api),
            options.query,
            options.retry,
            options.max_pages,
        ));
        let match_fetcher = Arc::new(MatchFetcher::new(
            api,
            Arc::clone(&store),
            options.retry,
        ));

        Self {
            store,
            list_fetcher,
            match_fetcher,
            options,
            stop: StopSignal::never(),
        }
    }

    /// Attaches a stop signal; a raised signal ends the crawl cooperatively
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Crawls outward from `seeds` for at most `degree` rounds
    ///
    /// Failures scoped to one account or match are recorded in the report;
    /// only an invalid degree or a store fault returns an error.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The crawl finished or was stopped cleanly
    /// * `Err(SpiderError)` - Invalid degree or the store became unavailable
    pub async fn crawl(&self, seeds: &[AccountId], degree: u32) -> Result<CrawlReport> {
        if degree < 1 {
            return Err(SpiderError::InvalidDegree(degree));
        }

        let seeds: Vec<AccountId> = seeds
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let seed_hash = seed_set_hash(&seeds);
        let mut state = self.prepare_run(&seeds, degree, &seed_hash)?;
        let run_id = state.run_id;

        match self.run_rounds(&mut state, degree).await {
            Ok(progress) => {
                let status = if progress.interrupted {
                    RunStatus::Interrupted
                } else {
                    RunStatus::Completed
                };
                self.store.finish_run(run_id, status)?;
                self.build_report(&state, progress)
            }
            Err(e) => {
                tracing::error!("Crawl run {} aborted: {}", run_id, e);
                if let Err(mark_err) = self.store.finish_run(run_id, RunStatus::Failed) {
                    tracing::warn!("Could not mark run {} failed: {}", run_id, mark_err);
                }
                Err(e)
            }
        }
    }

    /// Resumes the latest matching run or starts a new one
    fn prepare_run(
        &self,
        seeds: &[AccountId],
        degree: u32,
        seed_hash: &str,
    ) -> Result<RoundState> {
        if let Some(run) = self.store.get_latest_run()? {
            let same_crawl = run.seed_hash == seed_hash && run.degree == degree;

            if self.options.resume && same_crawl && run.status.is_resumable() {
                let mut visited = HashSet::new();
                let mut frontier = Vec::new();
                for (round, account) in self.store.load_frontiers(run.id)? {
                    if round <= run.round {
                        visited.insert(account);
                    }
                    if round == run.round {
                        frontier.push(account);
                    }
                }
                // Interrupted before the seed frontier was persisted
                if frontier.is_empty() && run.round == 0 {
                    frontier = seeds.to_vec();
                }
                let discovered = self
                    .store
                    .load_discovered(run.id, run.round + 1)?
                    .into_iter()
                    .collect::<HashSet<_>>();

                tracing::info!(
                    "Resuming run {} at round {} ({} accounts in frontier, {} already discovered)",
                    run.id,
                    run.round,
                    frontier.len(),
                    discovered.len()
                );

                return Ok(RoundState {
                    run_id: run.id,
                    round: run.round,
                    frontier,
                    visited,
                    discovered,
                });
            }

            if run.status == RunStatus::Running {
                tracing::info!("Abandoning unfinished run {}", run.id);
                self.store.finish_run(run.id, RunStatus::Interrupted)?;
            }
        }

        let run_id = self.store.create_run(seed_hash, degree)?;
        tracing::info!(
            "Starting run {} with {} seed accounts, degree {}",
            run_id,
            seeds.len(),
            degree
        );

        Ok(RoundState {
            run_id,
            round: 0,
            frontier: seeds.to_vec(),
            visited: HashSet::new(),
            discovered: HashSet::new(),
        })
    }

    /// Runs rounds until the frontier is exhausted, the degree is reached
    /// or a stop is requested
    async fn run_rounds(&self, state: &mut RoundState, degree: u32) -> Result<Progress> {
        let pool = WorkerPool::new(self.options.workers, self.stop.clone());
        let mut progress = Progress {
            rounds_completed: state.round,
            ..Default::default()
        };

        loop {
            let round = state.round;

            if state.frontier.is_empty() {
                tracing::info!("Frontier empty at round {}, crawl complete", round);
                break;
            }
            if self.stop.is_stopped() {
                progress.interrupted = true;
                break;
            }

            self.store.save_frontier(state.run_id, round, &state.frontier)?;
            state.visited.extend(state.frontier.iter().copied());

            let expand = round + 1 < degree;
            tracing::info!(
                "Round {}/{}: crawling {} accounts",
                round + 1,
                degree,
                state.frontier.len()
            );

            let discovered = Arc::new(Mutex::new(std::mem::take(&mut state.discovered)));
            let unit = CrawlUnit {
                store: Arc::clone(&self.store),
                list_fetcher: Arc::clone(&self.list_fetcher),
                match_fetcher: Arc::clone(&self.match_fetcher),
                discovered: Arc::clone(&discovered),
                stop: self.stop.clone(),
                run_id: state.run_id,
                round,
                expand,
            };

            let frontier = std::mem::take(&mut state.frontier);
            let outcome = pool
                .run(frontier, |account| unit.clone().run(account))
                .await?;

            let mut interrupted = outcome.undispatched > 0;
            for result in &outcome.results {
                progress.matches_fetched += result.new_matches as u64;
                progress.failed_matches += result.failed_matches as u64;
                interrupted |= result.interrupted;
            }

            let discovered = {
                let mut guard = discovered
                    .lock()
                    .map_err(|_| SpiderError::Worker("discovered accounts lock poisoned".to_string()))?;
                std::mem::take(&mut *guard)
            };

            if interrupted {
                tracing::info!("Round {} interrupted", round + 1);
                state.discovered = discovered;
                progress.interrupted = true;
                break;
            }

            progress.rounds_completed = round + 1;

            if !expand {
                tracing::info!("Reached degree {}, crawl complete", degree);
                break;
            }

            let mut next: Vec<AccountId> = discovered
                .into_iter()
                .filter(|account| !state.visited.contains(account))
                .collect();
            next.sort();

            tracing::info!(
                "Round {} complete: {} new accounts for round {}",
                round + 1,
                next.len(),
                round + 2
            );

            state.round += 1;
            state.frontier = next;
        }

        Ok(progress)
    }

    fn build_report(&self, state: &RoundState, progress: Progress) -> Result<CrawlReport> {
        let report = CrawlReport {
            run_id: state.run_id,
            rounds_completed: progress.rounds_completed,
            accounts_visited: state.visited.len() as u64,
            matches_fetched: progress.matches_fetched,
            accounts_stored: self.store.count_accounts()?,
            matches_stored: self.store.count_matches()?,
            failed_accounts: self.store.load_failed_accounts(state.run_id)?,
            failed_matches: progress.failed_matches,
            interrupted: progress.interrupted,
        };

        tracing::info!(
            "Run {} finished: {} accounts visited, {} matches fetched, {} accounts failed",
            report.run_id,
            report.accounts_visited,
            report.matches_fetched,
            report.failed_accounts.len()
        );

        Ok(report)
    }
}

impl CrawlUnit {
    /// Crawls a single account
    ///
    /// 1. Reads the cached match list or fetches and stores it
    /// 2. Fetches every match not yet stored
    /// 3. Adds participants of newly fetched matches to the accumulator
    async fn run(self, account: AccountId) -> Result<UnitOutcome> {
        let match_ids = if self.store.has_account_matches(account)? {
            tracing::debug!("Using cached match list for account {}", account);
            self.store.get_account_matches(account)?.ok_or_else(|| {
                StorageError::Corrupt(format!("match list for account {} vanished", account))
            })?
        } else {
            match self.list_fetcher.fetch_all(account).await {
                Ok(ids) => {
                    self.store.put_account_matches(account, &ids)?;
                    ids
                }
                Err(e) => {
                    tracing::warn!("Account {} failed: {}", account, e);
                    self.store.record_failed_account(
                        self.run_id,
                        &FailedAccount {
                            account,
                            kind: e.kind().to_string(),
                            message: e.to_string(),
                        },
                    )?;
                    return Ok(UnitOutcome {
                        new_matches: 0,
                        failed_matches: 0,
                        interrupted: false,
                    });
                }
            }
        };

        // A failure recorded before a resume no longer applies
        self.store.clear_failed_account(self.run_id, account)?;

        let batch = self.match_fetcher.fetch_many(&match_ids, &self.stop).await?;

        if self.expand && !batch.fetched.is_empty() {
            let participants: Vec<AccountId> = batch
                .fetched
                .iter()
                .flat_map(|record| record.participants())
                .filter(|id| *id != account)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            self.store
                .add_discovered(self.run_id, self.round + 1, &participants)?;
            self.discovered
                .lock()
                .map_err(|_| SpiderError::Worker("discovered accounts lock poisoned".to_string()))?
                .extend(participants);
        }

        tracing::debug!(
            "Account {}: {} matches, {} new, {} failed",
            account,
            match_ids.len(),
            batch.fetched.len(),
            batch.failed.len()
        );

        Ok(UnitOutcome {
            new_matches: batch.fetched.len(),
            failed_matches: batch.failed.len(),
            interrupted: batch.interrupted,
        })
    }
}

/// Identity of a seed set, independent of order and duplicates
pub fn seed_set_hash(seeds: &[AccountId]) -> String {
    let sorted: BTreeSet<_> = seeds.iter().collect();
    let mut hasher = Sha256::new();
    for account in sorted {
        hasher.update(account.0.to_be_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Runs a complete crawl from a configuration
///
/// This function wires everything together:
///
/// 1. Builds the shared rate limiter and the HTTP client
/// 2. Opens the store
/// 3. Collects the seed accounts
/// 4. Crawls for the configured degree
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `fresh` - Ignore the progress of an interrupted run
/// * `stop` - Signal that ends the crawl cooperatively
///
/// # Example
///
/// ```no_run
/// use match_spider::config::load_config;
/// use match_spider::crawler::{run_crawl, StopSignal};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// let report = run_crawl(config, false, StopSignal::never()).await?;
/// println!("{} matches stored", report.matches_stored);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, fresh: bool, stop: StopSignal) -> Result<CrawlReport> {
    let limiter = Arc::new(RateLimiter::new(&config.rate_limits));
    let api: Arc<dyn RemoteApi> = Arc::new(HttpApiClient::new(&config.api, limiter)?);
    let store: Arc<dyn Store> = Arc::new(open_store(Path::new(&config.output.database_path))?);

    let seeds = crate::api::collect_seeds(api.as_ref(), &config.seeds).await?;

    let mut options = CrawlOptions::from_config(&config);
    options.resume = !fresh;

    Crawler::new(api, store, options)
        .with_stop_signal(stop)
        .crawl(&seeds, config.crawler.degree)
        .await
}
