//! Match-Spider: a bounded-degree crawler for player/match graphs
//!
//! This crate walks the social graph exposed by a remote gaming API. Starting
//! from a seed set of accounts it downloads each account's match list, fetches
//! the full match records, and optionally expands to the other participants of
//! those matches for a bounded number of rounds, persisting everything in a
//! resumable store.

pub mod api;
pub mod config;
pub mod crawler;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Match-Spider operations
///
/// Only configuration problems and infrastructure faults surface here during a
/// crawl. Failures scoped to a single account or match are recorded in the
/// crawl report instead.
#[derive(Debug, Error)]
pub enum SpiderError {
    #[error("Degree must be >= 1, got {0}")]
    InvalidDegree(u32),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] storage::StorageError),

    #[error("Remote API error: {0}")]
    Api(#[from] ApiError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors surfaced by the remote API, classified for the retry policy
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Server-side fault (5xx, 429, timeouts); retried with backoff
    #[error("Transient remote error (status {status:?}): {message}")]
    Transient {
        status: Option<u16>,
        message: String,
        /// Server-requested delay before the next attempt
        retry_after: Option<std::time::Duration>,
    },

    /// Client-side fault (4xx other than 429); never retried
    #[error("Remote error {status}: {message}")]
    Permanent { status: u16, message: String },

    /// Body did not match the expected schema
    #[error("Failed to decode remote response: {0}")]
    Decode(String),

    /// Paging that cannot terminate (stalled index, page bound exceeded)
    #[error("Inconsistent remote data: {0}")]
    Inconsistent(String),
}

impl ApiError {
    /// Returns true if the failed call may succeed when retried
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns true for 404/401/403 style failures
    pub fn is_not_found_or_unauthorized(&self) -> bool {
        matches!(self, Self::Permanent { status, .. } if matches!(status, 401 | 403 | 404))
    }

    /// Short label used when recording failures
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::Permanent { .. } => "permanent",
            Self::Decode(_) => "decode",
            Self::Inconsistent(_) => "inconsistent",
        }
    }
}

/// Result type alias for Match-Spider operations
pub type Result<T> = std::result::Result<T, SpiderError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for remote API operations
pub type ApiResult<T> = std::result::Result<T, ApiError>;

// Re-export commonly used types
pub use api::{AccountId, MatchId, MatchRecord, RemoteApi};
pub use config::Config;
pub use crawler::{crawl, CrawlReport, Crawler};
pub use storage::{SqliteStore, Store};
