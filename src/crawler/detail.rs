//! Detail page access
//!
//! A detail fetch is a single attempt: request the item's URL, hand the body to
//! the document parser, and classify whatever went wrong. Retries live in the
//! worker loop, which consults the retry policy between attempts.

use crate::crawler::fetcher::{classify_status, transport_error, FetchError, StatusClass};
use crate::crawler::parser::{DetailOutcome, DocumentParser, SkipReason};
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::future::Future;

/// Fetches and parses one item
pub trait DetailFetcher: Send + Sync + 'static {
    /// Makes one attempt at `id`, presenting `identity` as the User-Agent
    ///
    /// # Returns
    ///
    /// * `Ok(DetailOutcome::Record)` - Parsed record
    /// * `Ok(DetailOutcome::Skip)` - Nothing usable; never retried
    /// * `Err(FetchError::Transient)` - Network error, timeout, 5xx
    /// * `Err(FetchError::RateLimited)` - 403/429; wants the longer cooldown
    /// * `Err(FetchError::Parse)` - Unclassifiable document
    fn fetch(
        &self,
        id: &str,
        identity: &str,
    ) -> impl Future<Output = Result<DetailOutcome, FetchError>> + Send;
}

/// Detail fetcher backed by HTTP and a [`DocumentParser`]
pub struct HttpDetailFetcher<P> {
    client: Client,
    parser: P,
}

impl<P: DocumentParser> HttpDetailFetcher<P> {
    pub fn new(client: Client, parser: P) -> Self {
        Self { client, parser }
    }
}

impl<P: DocumentParser> DetailFetcher for HttpDetailFetcher<P> {
    async fn fetch(&self, id: &str, identity: &str) -> Result<DetailOutcome, FetchError> {
        let response = self
            .client
            .get(id)
            .header(USER_AGENT, identity)
            .send()
            .await
            .map_err(|e| transport_error(id, &e))?;

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => {}
            StatusClass::NotFound => return Ok(DetailOutcome::Skip(SkipReason::NotFound)),
            StatusClass::RateLimited => {
                tracing::warn!("Access denied for {} (HTTP {})", id, status.as_u16());
                return Err(FetchError::RateLimited {
                    url: id.to_string(),
                    status: status.as_u16(),
                });
            }
            StatusClass::Transient => {
                return Err(FetchError::Transient {
                    url: id.to_string(),
                    reason: format!("HTTP {}", status.as_u16()),
                })
            }
        }

        let body = response.text().await.map_err(|e| transport_error(id, &e))?;

        self.parser
            .parse(id, &body)
            .map_err(|message| FetchError::Parse {
                url: id.to_string(),
                message,
            })
    }
}
