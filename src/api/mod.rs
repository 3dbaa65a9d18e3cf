//! Remote API module
//!
//! This module contains everything that talks to the remote gaming API:
//! - Identifier and record types (accounts, matches, match-list pages)
//! - The [`RemoteApi`] trait consumed by the crawler
//! - The HTTP client implementation
//! - Seed bootstrap from configured ids, names and match dumps

mod client;
mod seed;
mod traits;
mod types;

pub use client::{classify_status, HttpApiClient};
pub use seed::{collect_seeds, load_seed_file};
pub use traits::RemoteApi;
pub use types::{AccountId, MatchId, MatchListEntry, MatchListPage, MatchListQuery, MatchRecord};
