//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::api::{AccountId, MatchId, MatchRecord};
use crate::storage::{FailedAccount, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Storage lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Corrupt entry: {0}")]
    Corrupt(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every method takes `&self` and is safe to call from concurrent workers.
/// Implementations synchronize internally, one lock per entity kind, so
/// account writes never wait on match writes.
///
/// Account match lists and match records are written at most once: a `put`
/// for a key that already exists leaves the stored entry untouched and
/// returns `false`.
pub trait Store: Send + Sync {
    // ===== Account Match Lists =====

    /// Checks whether the full match list for `account` is stored
    fn has_account_matches(&self, account: AccountId) -> StorageResult<bool>;

    /// Gets the stored match list for `account`, in the order it was fetched
    fn get_account_matches(&self, account: AccountId) -> StorageResult<Option<Vec<MatchId>>>;

    /// Stores the match list for `account`
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The list was written
    /// * `Ok(false)` - A list was already stored; nothing changed
    fn put_account_matches(&self, account: AccountId, matches: &[MatchId]) -> StorageResult<bool>;

    /// Counts stored account match lists
    fn count_accounts(&self) -> StorageResult<u64>;

    // ===== Match Records =====

    /// Checks whether the record for `match_id` is stored
    fn has_match(&self, match_id: MatchId) -> StorageResult<bool>;

    /// Gets the stored record for `match_id`
    fn get_match(&self, match_id: MatchId) -> StorageResult<Option<MatchRecord>>;

    /// Stores a match record; `Ok(false)` if it was already present
    fn put_match(&self, record: &MatchRecord) -> StorageResult<bool>;

    /// Counts stored match records
    fn count_matches(&self) -> StorageResult<u64>;

    // ===== Run Management =====

    /// Creates a new crawl run for a seed set and degree
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&self, seed_hash: &str, degree: u32) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Lists all runs, newest first
    fn list_runs(&self) -> StorageResult<Vec<RunRecord>>;

    /// Marks a run finished with the given status
    fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Frontier Persistence =====

    /// Records the frontier of `round` and advances the run to that round
    fn save_frontier(&self, run_id: i64, round: u32, accounts: &[AccountId])
        -> StorageResult<()>;

    /// Loads every persisted frontier of a run as `(round, account)` pairs
    fn load_frontiers(&self, run_id: i64) -> StorageResult<Vec<(u32, AccountId)>>;

    /// Adds accounts discovered for `round` to the run's accumulator
    fn add_discovered(&self, run_id: i64, round: u32, accounts: &[AccountId])
        -> StorageResult<()>;

    /// Loads the accumulator of accounts discovered for `round`
    fn load_discovered(&self, run_id: i64, round: u32) -> StorageResult<Vec<AccountId>>;

    // ===== Failure Ledger =====

    /// Records an account whose crawl unit failed; replaces an earlier entry
    fn record_failed_account(&self, run_id: i64, failure: &FailedAccount) -> StorageResult<()>;

    /// Removes `account` from a run's ledger once its unit has succeeded
    fn clear_failed_account(&self, run_id: i64, account: AccountId) -> StorageResult<()>;

    /// Loads the failed accounts of a run
    fn load_failed_accounts(&self, run_id: i64) -> StorageResult<Vec<FailedAccount>>;
}
