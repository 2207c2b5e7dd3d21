use serde::Deserialize;

/// Browser identities rotated across requests when none are configured
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Firefox/89.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:89.0) Firefox/89.0",
];

/// Main configuration structure for Reel-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub output: OutputConfig,
}

/// Crawl size and pacing
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of records to collect before stopping
    pub target: usize,

    /// Number of detail fetches allowed in flight at once
    pub workers: u32,

    /// Entries requested per listing page
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Lower bound of the randomized pause between listing pages (milliseconds)
    #[serde(rename = "list-delay-min-ms", default = "default_list_delay_min_ms")]
    pub list_delay_min_ms: u64,

    /// Upper bound of the randomized pause between listing pages (milliseconds)
    #[serde(rename = "list-delay-max-ms", default = "default_list_delay_max_ms")]
    pub list_delay_max_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Listing endpoint and request identity
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Listing endpoint returning `{"data": [{"url": ...}]}`
    #[serde(rename = "list-url")]
    pub list_url: String,

    /// Value of the `sort` query parameter
    #[serde(default = "default_sort")]
    pub sort: String,

    /// Value of the `range` query parameter
    #[serde(default = "default_range")]
    pub range: String,

    /// Value of the `tags` query parameter
    #[serde(default)]
    pub tags: String,

    /// User-Agent values picked at random per request
    #[serde(rename = "user-agents", default = "default_user_agents")]
    pub user_agents: Vec<String>,
}

/// Retry and cooldown tuning
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Attempts per page or item before giving up on it
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit for transient failures; attempt N waits N times this
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Fixed wait after a 403/429 response
    #[serde(rename = "rate-limit-cooldown-ms", default = "default_rate_limit_cooldown_ms")]
    pub rate_limit_cooldown_ms: u64,

    /// Failed rounds in a row that trigger the global cooldown
    #[serde(
        rename = "max-consecutive-failures",
        default = "default_max_consecutive_failures"
    )]
    pub max_consecutive_failures: u32,

    /// Length of the global cooldown
    #[serde(rename = "global-cooldown-ms", default = "default_global_cooldown_ms")]
    pub global_cooldown_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            rate_limit_cooldown_ms: default_rate_limit_cooldown_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            global_cooldown_ms: default_global_cooldown_ms(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the JSON checkpoint file
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,

    /// Path to the final CSV table
    #[serde(rename = "export-path")]
    pub export_path: String,

    /// Save a checkpoint after this many newly collected records
    #[serde(rename = "checkpoint-every", default = "default_checkpoint_every")]
    pub checkpoint_every: usize,

    /// Write a numbered snapshot of the table every this many records
    #[serde(rename = "snapshot-every", default)]
    pub snapshot_every: Option<usize>,

    /// Previously exported table to start from when no checkpoint exists
    #[serde(rename = "seed-path", default)]
    pub seed_path: Option<String>,
}

fn default_list_delay_min_ms() -> u64 {
    1000
}

fn default_list_delay_max_ms() -> u64 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_sort() -> String {
    "rating".to_string()
}

fn default_range() -> String {
    "0,10".to_string()
}

fn default_user_agents() -> Vec<String> {
    DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_rate_limit_cooldown_ms() -> u64 {
    5000
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_global_cooldown_ms() -> u64 {
    120_000
}

fn default_checkpoint_every() -> usize {
    50
}
