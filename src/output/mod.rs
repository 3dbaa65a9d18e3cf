//! Output module for crawl reports and store statistics
//!
//! This module handles:
//! - Printing the report of a finished crawl
//! - Loading and printing statistics from an existing store

pub mod stats;

pub use stats::{load_statistics, print_statistics, run_duration_seconds, StoreStatistics};

use crate::crawler::CrawlReport;

/// Prints a crawl report to stdout
pub fn print_report(report: &CrawlReport) {
    println!("=== Crawl Report (run {}) ===\n", report.run_id);

    if report.interrupted {
        println!("Crawl was interrupted; rerun to resume.\n");
    }

    println!("  Rounds completed: {}", report.rounds_completed);
    println!("  Accounts visited: {}", report.accounts_visited);
    println!("  Matches fetched: {}", report.matches_fetched);
    println!("  Accounts stored: {}", report.accounts_stored);
    println!("  Matches stored: {}", report.matches_stored);

    if report.failed_matches > 0 {
        println!("  Matches skipped after errors: {}", report.failed_matches);
    }

    if !report.failed_accounts.is_empty() {
        println!("\nFailed Accounts ({}):", report.failed_accounts.len());
        for failure in &report.failed_accounts {
            println!(
                "  - {} [{}]: {}",
                failure.account, failure.kind, failure.message
            );
        }
    }
}
