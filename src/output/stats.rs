//! Statistics generation from the crawl store
//!
//! This module provides functionality for extracting and displaying
//! store totals and run history.

use crate::storage::{FailedAccount, RunRecord, Store};
use crate::SpiderError;

/// Store statistics summary
#[derive(Debug, Clone)]
pub struct StoreStatistics {
    /// Number of accounts whose match list is stored
    pub accounts_stored: u64,

    /// Number of stored match records
    pub matches_stored: u64,

    /// All runs, newest first
    pub runs: Vec<RunRecord>,

    /// Failed accounts of the most recent run
    pub latest_failures: Vec<FailedAccount>,
}

/// Loads statistics from a store
///
/// # Arguments
///
/// * `store` - The store to query
///
/// # Returns
///
/// * `Ok(StoreStatistics)` - Successfully loaded statistics
/// * `Err(SpiderError)` - Failed to query the store
pub fn load_statistics(store: &dyn Store) -> Result<StoreStatistics, SpiderError> {
    let accounts_stored = store.count_accounts()?;
    let matches_stored = store.count_matches()?;
    let runs = store.list_runs()?;

    let latest_failures = match runs.first() {
        Some(run) => store.load_failed_accounts(run.id)?,
        None => Vec::new(),
    };

    Ok(StoreStatistics {
        accounts_stored,
        matches_stored,
        runs,
        latest_failures,
    })
}

/// Wall-clock duration of a finished run, in seconds
pub fn run_duration_seconds(run: &RunRecord) -> Option<i64> {
    let started = run
        .started_at
        .parse::<chrono::DateTime<chrono::Utc>>()
        .ok()?;
    let finished = run
        .finished_at
        .as_deref()?
        .parse::<chrono::DateTime<chrono::Utc>>()
        .ok()?;
    Some((finished - started).num_seconds())
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Store Statistics ===\n");

    println!("Overview:");
    println!("  Accounts with stored match lists: {}", stats.accounts_stored);
    println!("  Stored matches: {}", stats.matches_stored);
    println!();

    println!("Runs ({}):", stats.runs.len());
    for run in &stats.runs {
        let duration = run_duration_seconds(run)
            .map(|secs| format!(", {}s", secs))
            .unwrap_or_default();
        println!(
            "  #{}: {:?}, degree {}, reached round {}{} (started {})",
            run.id,
            run.status,
            run.degree,
            run.round + 1,
            duration,
            run.started_at
        );
    }
    println!();

    if !stats.latest_failures.is_empty() {
        println!(
            "Failed Accounts in Latest Run ({}):",
            stats.latest_failures.len()
        );
        for failure in &stats.latest_failures {
            println!(
                "  - {} [{}]: {}",
                failure.account, failure.kind, failure.message
            );
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AccountId, MatchId, MatchRecord};
    use crate::storage::{RunStatus, SqliteStore};
    use serde_json::json;

    #[test]
    fn test_statistics_of_empty_store() {
        let store = SqliteStore::new_in_memory().unwrap();

        let stats = load_statistics(&store).unwrap();

        assert_eq!(stats.accounts_stored, 0);
        assert_eq!(stats.matches_stored, 0);
        assert!(stats.runs.is_empty());
        assert!(stats.latest_failures.is_empty());
    }

    #[test]
    fn test_statistics_reflect_latest_run() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .put_account_matches(AccountId(1), &[MatchId(10), MatchId(11)])
            .unwrap();
        store
            .put_match(&MatchRecord::new(MatchId(10), json!({ "gameId": 10 })))
            .unwrap();

        let old_run = store.create_run("abc", 1).unwrap();
        store
            .record_failed_account(
                old_run,
                &FailedAccount {
                    account: AccountId(5),
                    kind: "permanent".to_string(),
                    message: "404".to_string(),
                },
            )
            .unwrap();
        store.finish_run(old_run, RunStatus::Completed).unwrap();
        let new_run = store.create_run("abc", 1).unwrap();

        let stats = load_statistics(&store).unwrap();

        assert_eq!(stats.accounts_stored, 1);
        assert_eq!(stats.matches_stored, 1);
        assert_eq!(stats.runs.len(), 2);
        assert_eq!(stats.runs[0].id, new_run);
        assert!(stats.latest_failures.is_empty());
    }

    #[test]
    fn test_run_duration() {
        let run = RunRecord {
            id: 1,
            started_at: "2024-01-01T00:00:00+00:00".to_string(),
            finished_at: Some("2024-01-01T00:02:30+00:00".to_string()),
            seed_hash: String::new(),
            degree: 1,
            round: 0,
            status: RunStatus::Completed,
        };

        assert_eq!(run_duration_seconds(&run), Some(150));

        let unfinished = RunRecord {
            finished_at: None,
            ..run
        };
        assert_eq!(run_duration_seconds(&unfinished), None);
    }
}
