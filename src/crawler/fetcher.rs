//! HTTP plumbing shared by the listing and detail fetchers
//!
//! This module handles:
//! - Building the HTTP client with timeouts and compression
//! - Rotating the User-Agent identity per request
//! - Classifying response statuses and transport errors into `FetchError`

use crate::config::CrawlerConfig;
use crate::crawler::retry::ErrorKind;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Failure of a single fetch attempt
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Network error, timeout, undecodable body, or 5xx-like status
    #[error("Transient failure for {url}: {reason}")]
    Transient { url: String, reason: String },

    /// The server refused us (403/429)
    #[error("Rate limited by {url} (HTTP {status})")]
    RateLimited { url: String, status: u16 },

    /// The document could not be classified as a record or a skip
    #[error("Malformed document at {url}: {message}")]
    Parse { url: String, message: String },

    /// The listing returned an empty page
    #[error("Listing exhausted")]
    Exhausted,
}

impl FetchError {
    /// Maps the error onto the retry policy's categories
    ///
    /// Returns None for `Exhausted`, which is a normal end of the listing.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Transient { .. } => Some(ErrorKind::Transient),
            Self::RateLimited { .. } => Some(ErrorKind::RateLimited),
            Self::Parse { .. } => Some(ErrorKind::Parse),
            Self::Exhausted => None,
        }
    }
}

/// How a response status should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// 404/410: the item is gone
    NotFound,
    /// 403/429: back off for longer
    RateLimited,
    /// Anything else worth retrying
    Transient,
}

/// Classifies an HTTP status code
///
/// | Status | Class |
/// |--------|-------|
/// | 2xx | Success |
/// | 404, 410 | NotFound |
/// | 403, 429 | RateLimited |
/// | other | Transient |
pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        StatusClass::NotFound
    } else if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        StatusClass::RateLimited
    } else {
        StatusClass::Transient
    }
}

/// Converts a transport error into a transient fetch failure
pub fn transport_error(url: &str, error: &reqwest::Error) -> FetchError {
    let reason = if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        "Connection refused".to_string()
    } else {
        error.to_string()
    };

    FetchError::Transient {
        url: url.to_string(),
        reason,
    }
}

/// Builds an HTTP client with proper configuration
///
/// The User-Agent is not fixed on the client; each request picks one from the
/// [`IdentityPool`].
///
/// # Example
///
/// ```no_run
/// use reel_harvest::config::CrawlerConfig;
/// use reel_harvest::crawler::build_http_client;
///
/// let config = CrawlerConfig {
///     target: 100,
///     workers: 3,
///     page_size: 20,
///     list_delay_min_ms: 1000,
///     list_delay_max_ms: 2000,
///     request_timeout_secs: 10,
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &CrawlerConfig) -> Result<Client, reqwest::Error> {
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Pool of User-Agent values rotated across requests
///
/// Rotation has no effect on what gets collected.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    agents: Vec<String>,
}

impl IdentityPool {
    /// Creates a pool; an empty list falls back to a single generic identity
    pub fn new(agents: Vec<String>) -> Self {
        if agents.is_empty() {
            return Self {
                agents: vec![concat!("reel-harvest/", env!("CARGO_PKG_VERSION")).to_string()],
            };
        }
        Self { agents }
    }

    /// Picks one identity at random
    pub fn pick(&self) -> &str {
        &self.agents[fastrand::usize(..self.agents.len())]
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
