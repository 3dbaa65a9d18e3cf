use serde::Deserialize;

/// Main configuration structure for Match-Spider
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(rename = "rate-limit")]
    pub rate_limits: Vec<RateLimitWindow>,
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub seeds: SeedConfig,
}

/// Remote API connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the regional API host
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// API key sent with every request
    #[serde(rename = "api-key", default)]
    pub api_key: String,

    /// Queue filter for match-list requests (e.g. 420 for ranked solo)
    #[serde(default)]
    pub queue: Option<u32>,

    /// Season filter for match-list requests
    #[serde(default)]
    pub season: Option<u32>,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// One rate-limit window: at most `max_calls` calls per `window_secs`
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct RateLimitWindow {
    #[serde(rename = "max-calls")]
    pub max_calls: u32,

    #[serde(rename = "window-secs")]
    pub window_secs: u64,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of expansion rounds (D >= 1)
    #[serde(default = "default_degree")]
    pub degree: u32,

    /// Concurrent crawl units; 0 selects the available parallelism
    #[serde(default)]
    pub workers: usize,

    /// Retries for transient remote failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay (milliseconds), doubled per attempt
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Upper bound on a single backoff delay (milliseconds)
    #[serde(rename = "max-retry-delay-ms", default = "default_max_retry_delay")]
    pub max_retry_delay_ms: u64,

    /// Hard bound on pages fetched for one match list
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,
}

impl CrawlerConfig {
    /// Worker count with the 0 = "available parallelism" default resolved
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            degree: default_degree(),
            workers: 0,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
            max_retry_delay_ms: default_max_retry_delay(),
            max_pages: default_max_pages(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Seed accounts for the first round
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedConfig {
    /// Account ids used verbatim
    #[serde(default)]
    pub accounts: Vec<i64>,

    /// Player names resolved through the remote API
    #[serde(default)]
    pub summoners: Vec<String>,

    /// Seed match dumps whose participants join the seed set
    #[serde(rename = "seed-files", default)]
    pub seed_files: Vec<String>,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_degree() -> u32 {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2000
}

fn default_max_retry_delay() -> u64 {
    30_000
}

fn default_max_pages() -> u32 {
    100
}
