//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Store trait.
//! Each entity kind (account match lists, match records, run bookkeeping) has
//! its own connection behind its own mutex, so workers writing different kinds
//! never serialize against each other. Writes of the same kind are mutually
//! exclusive and use `INSERT OR IGNORE`, which makes every put write-once.

use crate::api::{AccountId, MatchId, MatchRecord};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult, Store};
use crate::storage::{FailedAccount, RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite storage backend
pub struct SqliteStore {
    accounts: Mutex<Connection>,
    matches: Mutex<Connection>,
    runs: Mutex<Connection>,
}

fn open_connection(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(30))?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA temp_store = MEMORY;
    ",
    )?;

    initialize_schema(&conn)?;
    Ok(conn)
}

fn open_memory_connection() -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    initialize_schema(&conn)?;
    Ok(conn)
}

fn lock<'a>(
    conn: &'a Mutex<Connection>,
    kind: &'static str,
) -> StorageResult<MutexGuard<'a, Connection>> {
    conn.lock().map_err(|_| StorageError::LockPoisoned(kind))
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        seed_hash: row.get(3)?,
        degree: row.get(4)?,
        round: row.get(5)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(6)?)
            .unwrap_or(RunStatus::Failed),
    })
}

const RUN_COLUMNS: &str = "id, started_at, finished_at, seed_hash, degree, round, status";

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        // First connection creates the file and the schema
        let accounts = open_connection(path)?;
        let matches = open_connection(path)?;
        let runs = open_connection(path)?;

        Ok(Self {
            accounts: Mutex::new(accounts),
            matches: Mutex::new(matches),
            runs: Mutex::new(runs),
        })
    }

    /// Creates an in-memory store
    ///
    /// Each entity kind lives in its own in-memory database; nothing survives
    /// the process.
    pub fn new_in_memory() -> StorageResult<Self> {
        Ok(Self {
            accounts: Mutex::new(open_memory_connection()?),
            matches: Mutex::new(open_memory_connection()?),
            runs: Mutex::new(open_memory_connection()?),
        })
    }
}

impl Store for SqliteStore {
    // ===== Account Match Lists =====

    fn has_account_matches(&self, account: AccountId) -> StorageResult<bool> {
        let conn = lock(&self.accounts, "accounts")?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM account_matches WHERE account_id = ?1",
                params![account.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_account_matches(&self, account: AccountId) -> StorageResult<Option<Vec<MatchId>>> {
        let conn = lock(&self.accounts, "accounts")?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT match_ids FROM account_matches WHERE account_id = ?1",
                params![account.0],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn put_account_matches(&self, account: AccountId, matches: &[MatchId]) -> StorageResult<bool> {
        let json = serde_json::to_string(matches)?;
        let now = Utc::now().to_rfc3339();

        let conn = lock(&self.accounts, "accounts")?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO account_matches (account_id, match_ids, match_count, fetched_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![account.0, json, matches.len() as i64, now],
        )?;
        Ok(inserted > 0)
    }

    fn count_accounts(&self) -> StorageResult<u64> {
        let conn = lock(&self.accounts, "accounts")?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM account_matches", [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }

    // ===== Match Records =====

    fn has_match(&self, match_id: MatchId) -> StorageResult<bool> {
        let conn = lock(&self.matches, "matches")?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM matches WHERE match_id = ?1",
                params![match_id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_match(&self, match_id: MatchId) -> StorageResult<Option<MatchRecord>> {
        let conn = lock(&self.matches, "matches")?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT body FROM matches WHERE match_id = ?1",
                params![match_id.0],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(json) => Ok(Some(MatchRecord::new(match_id, serde_json::from_str(&json)?))),
            None => Ok(None),
        }
    }

    fn put_match(&self, record: &MatchRecord) -> StorageResult<bool> {
        let body = serde_json::to_string(&record.body)?;
        let now = Utc::now().to_rfc3339();

        let conn = lock(&self.matches, "matches")?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO matches (match_id, body, fetched_at) VALUES (?1, ?2, ?3)",
            params![record.id.0, body, now],
        )?;
        Ok(inserted > 0)
    }

    fn count_matches(&self) -> StorageResult<u64> {
        let conn = lock(&self.matches, "matches")?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Run Management =====

    fn create_run(&self, seed_hash: &str, degree: u32) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = lock(&self.runs, "runs")?;
        conn.execute(
            "INSERT INTO runs (started_at, seed_hash, degree, round, status) VALUES (?1, ?2, ?3, 0, ?4)",
            params![now, seed_hash, degree, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = lock(&self.runs, "runs")?;
        conn.query_row(
            &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
            params![run_id],
            run_from_row,
        )
        .optional()?
        .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = lock(&self.runs, "runs")?;
        let run = conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn list_runs(&self) -> StorageResult<Vec<RunRecord>> {
        let conn = lock(&self.runs, "runs")?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM runs ORDER BY id DESC", RUN_COLUMNS))?;
        let runs = stmt
            .query_map([], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn finish_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = lock(&self.runs, "runs")?;
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Frontier Persistence =====

    fn save_frontier(
        &self,
        run_id: i64,
        round: u32,
        accounts: &[AccountId],
    ) -> StorageResult<()> {
        let mut conn = lock(&self.runs, "runs")?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO run_frontier (run_id, round, account_id) VALUES (?1, ?2, ?3)",
            )?;
            for account in accounts {
                stmt.execute(params![run_id, round, account.0])?;
            }
        }
        tx.execute(
            "UPDATE runs SET round = ?1 WHERE id = ?2",
            params![round, run_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn load_frontiers(&self, run_id: i64) -> StorageResult<Vec<(u32, AccountId)>> {
        let conn = lock(&self.runs, "runs")?;
        let mut stmt = conn.prepare(
            "SELECT round, account_id FROM run_frontier WHERE run_id = ?1 ORDER BY round, account_id",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get::<_, u32>(0)?, AccountId(row.get(1)?)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn add_discovered(
        &self,
        run_id: i64,
        round: u32,
        accounts: &[AccountId],
    ) -> StorageResult<()> {
        if accounts.is_empty() {
            return Ok(());
        }

        let mut conn = lock(&self.runs, "runs")?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO run_discovered (run_id, round, account_id) VALUES (?1, ?2, ?3)",
            )?;
            for account in accounts {
                stmt.execute(params![run_id, round, account.0])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_discovered(&self, run_id: i64, round: u32) -> StorageResult<Vec<AccountId>> {
        let conn = lock(&self.runs, "runs")?;
        let mut stmt = conn.prepare(
            "SELECT account_id FROM run_discovered WHERE run_id = ?1 AND round = ?2 ORDER BY account_id",
        )?;
        let rows = stmt
            .query_map(params![run_id, round], |row| Ok(AccountId(row.get(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ===== Failure Ledger =====

    fn record_failed_account(&self, run_id: i64, failure: &FailedAccount) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = lock(&self.runs, "runs")?;
        conn.execute(
            "INSERT OR REPLACE INTO failed_accounts (run_id, account_id, kind, message, failed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, failure.account.0, failure.kind, failure.message, now],
        )?;
        Ok(())
    }

    fn clear_failed_account(&self, run_id: i64, account: AccountId) -> StorageResult<()> {
        let conn = lock(&self.runs, "runs")?;
        conn.execute(
            "DELETE FROM failed_accounts WHERE run_id = ?1 AND account_id = ?2",
            params![run_id, account.0],
        )?;
        Ok(())
    }

    fn load_failed_accounts(&self, run_id: i64) -> StorageResult<Vec<FailedAccount>> {
        let conn = lock(&self.runs, "runs")?;
        let mut stmt = conn.prepare(
            "SELECT account_id, kind, message FROM failed_accounts WHERE run_id = ?1 ORDER BY account_id",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(FailedAccount {
                    account: AccountId(row.get(0)?),
                    kind: row.get(1)?,
                    message: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn record(id: i64, participants: &[i64]) -> MatchRecord {
        let identities: Vec<_> = participants
            .iter()
            .map(|a| json!({"player": {"accountId": a}}))
            .collect();
        MatchRecord::new(
            MatchId(id),
            json!({"gameId": id, "participantIdentities": identities}),
        )
    }

    #[test]
    fn test_account_matches_write_once() {
        let store = SqliteStore::new_in_memory().unwrap();
        let account = AccountId(42);

        assert!(!store.has_account_matches(account).unwrap());
        assert_eq!(store.get_account_matches(account).unwrap(), None);

        assert!(store
            .put_account_matches(account, &[MatchId(3), MatchId(1), MatchId(2)])
            .unwrap());
        assert!(!store.put_account_matches(account, &[MatchId(9)]).unwrap());

        assert!(store.has_account_matches(account).unwrap());
        assert_eq!(
            store.get_account_matches(account).unwrap(),
            Some(vec![MatchId(3), MatchId(1), MatchId(2)])
        );
        assert_eq!(store.count_accounts().unwrap(), 1);
    }

    #[test]
    fn test_empty_match_list_is_stored() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.put_account_matches(AccountId(1), &[]).unwrap());
        assert!(store.has_account_matches(AccountId(1)).unwrap());
        assert_eq!(store.get_account_matches(AccountId(1)).unwrap(), Some(vec![]));
    }

    #[test]
    fn test_match_write_once() {
        let store = SqliteStore::new_in_memory().unwrap();
        let first = record(7, &[1, 2]);

        assert!(!store.has_match(MatchId(7)).unwrap());
        assert!(store.put_match(&first).unwrap());
        assert!(!store.put_match(&record(7, &[9])).unwrap());

        let loaded = store.get_match(MatchId(7)).unwrap().unwrap();
        assert_eq!(loaded, first);
        assert_eq!(loaded.participants(), vec![AccountId(1), AccountId(2)]);
        assert_eq!(store.count_matches().unwrap(), 1);
        assert_eq!(store.get_match(MatchId(8)).unwrap(), None);
    }

    #[test]
    fn test_concurrent_puts_same_match() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.put_match(&record(1, &[1])).unwrap())
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(store.count_matches().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_puts_same_account() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());

        let handles: Vec<_> = (0..8i64)
            .map(|n| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .put_account_matches(AccountId(1), &[MatchId(n), MatchId(100 + n)])
                        .unwrap()
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|inserted| *inserted)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(store.count_accounts().unwrap(), 1);
        // Exactly one writer's list survives, never a mix
        let stored = store.get_account_matches(AccountId(1)).unwrap().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].0, stored[0].0 + 100);
    }

    #[test]
    fn test_run_lifecycle() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(store.get_latest_run().unwrap().is_none());

        let run_id = store.create_run("abc", 2).unwrap();
        let run = store.get_run(run_id).unwrap();
        assert_eq!(run.seed_hash, "abc");
        assert_eq!(run.degree, 2);
        assert_eq!(run.round, 0);
        assert_eq!(run.status, RunStatus::Running);

        store
            .save_frontier(run_id, 0, &[AccountId(1), AccountId(2)])
            .unwrap();
        store
            .add_discovered(run_id, 1, &[AccountId(3), AccountId(2)])
            .unwrap();
        store.add_discovered(run_id, 1, &[AccountId(3)]).unwrap();
        store.save_frontier(run_id, 1, &[AccountId(3)]).unwrap();

        assert_eq!(store.get_run(run_id).unwrap().round, 1);
        assert_eq!(
            store.load_frontiers(run_id).unwrap(),
            vec![(0, AccountId(1)), (0, AccountId(2)), (1, AccountId(3))]
        );
        assert_eq!(
            store.load_discovered(run_id, 1).unwrap(),
            vec![AccountId(2), AccountId(3)]
        );

        store.finish_run(run_id, RunStatus::Completed).unwrap();
        let run = store.get_latest_run().unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
        assert_eq!(store.list_runs().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_run() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert!(matches!(
            store.get_run(99),
            Err(StorageError::RunNotFound(99))
        ));
        assert!(store.finish_run(99, RunStatus::Completed).is_err());
    }

    #[test]
    fn test_failed_account_ledger_replaces() {
        let store = SqliteStore::new_in_memory().unwrap();
        let run_id = store.create_run("abc", 1).unwrap();

        let failure = FailedAccount {
            account: AccountId(5),
            kind: "transient".to_string(),
            message: "503".to_string(),
        };
        store.record_failed_account(run_id, &failure).unwrap();
        store
            .record_failed_account(
                run_id,
                &FailedAccount {
                    kind: "permanent".to_string(),
                    message: "404".to_string(),
                    ..failure
                },
            )
            .unwrap();

        let failed = store.load_failed_accounts(run_id).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].kind, "permanent");
    }

    #[test]
    fn test_cleared_failure_leaves_ledger() {
        let store = SqliteStore::new_in_memory().unwrap();
        let run_id = store.create_run("abc", 1).unwrap();
        let other_run = store.create_run("def", 1).unwrap();

        for run in [run_id, other_run] {
            for account in [5, 6] {
                store
                    .record_failed_account(
                        run,
                        &FailedAccount {
                            account: AccountId(account),
                            kind: "transient".to_string(),
                            message: "503".to_string(),
                        },
                    )
                    .unwrap();
            }
        }

        store.clear_failed_account(run_id, AccountId(5)).unwrap();
        // Clearing an account that never failed is fine
        store.clear_failed_account(run_id, AccountId(7)).unwrap();

        let failed = store.load_failed_accounts(run_id).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].account, AccountId(6));
        assert_eq!(store.load_failed_accounts(other_run).unwrap().len(), 2);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spider.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store.put_account_matches(AccountId(1), &[MatchId(10)]).unwrap();
            store.put_match(&record(10, &[1, 2])).unwrap();
            store.create_run("abc", 1).unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        assert!(store.has_account_matches(AccountId(1)).unwrap());
        assert!(store.has_match(MatchId(10)).unwrap());
        assert_eq!(store.list_runs().unwrap().len(), 1);
    }
}
