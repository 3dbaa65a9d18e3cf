//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Match-Spider database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Full match list per account, written once
CREATE TABLE IF NOT EXISTS account_matches (
    account_id INTEGER PRIMARY KEY,
    match_ids TEXT NOT NULL,
    match_count INTEGER NOT NULL,
    fetched_at TEXT NOT NULL
);

-- Full match record per match id, written once
CREATE TABLE IF NOT EXISTS matches (
    match_id INTEGER PRIMARY KEY,
    body TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);

-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    seed_hash TEXT NOT NULL,
    degree INTEGER NOT NULL,
    round INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL
);

-- Frontier of every round of a run
CREATE TABLE IF NOT EXISTS run_frontier (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    round INTEGER NOT NULL,
    account_id INTEGER NOT NULL,
    PRIMARY KEY (run_id, round, account_id)
);

-- Accounts discovered for the next round, before visited accounts are removed
CREATE TABLE IF NOT EXISTS run_discovered (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    round INTEGER NOT NULL,
    account_id INTEGER NOT NULL,
    PRIMARY KEY (run_id, round, account_id)
);

-- Accounts whose crawl unit failed
CREATE TABLE IF NOT EXISTS failed_accounts (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    account_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    message TEXT NOT NULL,
    failed_at TEXT NOT NULL,
    PRIMARY KEY (run_id, account_id)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
