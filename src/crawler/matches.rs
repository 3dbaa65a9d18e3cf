//! Match record retrieval
//!
//! A match is usually reachable from several accounts of the same frontier.
//! Workers share one `MatchFetcher`, which claims a match id before fetching
//! it, so each match is requested at most once per crawl no matter how many
//! workers come across it.

use crate::api::{MatchId, MatchRecord, RemoteApi};
use crate::crawler::pool::StopSignal;
use crate::crawler::retry::{with_retry, RetryPolicy};
use crate::storage::{StorageError, StorageResult, Store};
use crate::ApiError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Result of fetching the matches of one account
#[derive(Debug, Default)]
pub struct MatchBatch {
    /// Records fetched and stored by this batch
    pub fetched: Vec<MatchRecord>,
    /// Matches that could not be fetched
    pub failed: Vec<(MatchId, ApiError)>,
    /// Matches already stored or claimed by another worker
    pub skipped: usize,
    /// The batch stopped early because a stop was requested
    pub interrupted: bool,
}

/// Fetches match records, at most once per match id
pub struct MatchFetcher {
    api: Arc<dyn RemoteApi>,
    store: Arc<dyn Store>,
    retry: RetryPolicy,
    claimed: Mutex<HashSet<MatchId>>,
}

impl MatchFetcher {
    pub fn new(api: Arc<dyn RemoteApi>, store: Arc<dyn Store>, retry: RetryPolicy) -> Self {
        Self {
            api,
            store,
            retry,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Claims `match_id` for the calling worker
    ///
    /// Returns `false` when another worker already claimed it.
    fn claim(&self, match_id: MatchId) -> StorageResult<bool> {
        let mut claimed = self
            .claimed
            .lock()
            .map_err(|_| StorageError::LockPoisoned("match claims"))?;
        Ok(claimed.insert(match_id))
    }

    /// Fetches and stores every match in `match_ids` not yet stored
    ///
    /// Remote failures are reported per match in the returned batch; only
    /// store failures abort the batch.
    pub async fn fetch_many(
        &self,
        match_ids: &[MatchId],
        stop: &StopSignal,
    ) -> StorageResult<MatchBatch> {
        let mut batch = MatchBatch::default();

        for &match_id in match_ids {
            if self.store.has_match(match_id)? || !self.claim(match_id)? {
                batch.skipped += 1;
                continue;
            }

            if stop.is_stopped() {
                batch.interrupted = true;
                self.release(match_id)?;
                break;
            }

            match with_retry(&self.retry, "match", || self.api.fetch_match(match_id)).await {
                Ok(record) => {
                    if self.store.put_match(&record)? {
                        batch.fetched.push(record);
                    } else {
                        batch.skipped += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to fetch match {}: {}", match_id, e);
                    batch.failed.push((match_id, e));
                }
            }
        }

        Ok(batch)
    }

    /// Drops a claim that was taken but never fetched
    fn release(&self, match_id: MatchId) -> StorageResult<()> {
        self.claimed
            .lock()
            .map_err(|_| StorageError::LockPoisoned("match claims"))?
            .remove(&match_id);
        Ok(())
    }
}
