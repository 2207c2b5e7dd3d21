//! Listing endpoint access
//!
//! One call fetches one page of identifiers. Retrying is the caller's job, so
//! every attempt made against the endpoint is one the retry policy approved.

use crate::config::SourceConfig;
use crate::crawler::fetcher::{classify_status, transport_error, FetchError, IdentityPool, StatusClass};
use crate::state::Cursor;
use crate::url::normalize_identifier;
use crate::CrawlError;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;

/// One page of identifiers and the cursor that follows it
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    /// Identifiers in listing order
    pub ids: Vec<String>,

    /// Offset of each identifier within the raw page, parallel to `ids`
    ///
    /// Entries dropped by the fetcher leave gaps here.
    pub positions: Vec<usize>,

    /// Cursor of the page after this one
    pub next: Cursor,
}

impl ListPage {
    /// A page where every raw entry produced an identifier
    pub fn contiguous(ids: Vec<String>, next: Cursor) -> Self {
        let positions = (0..ids.len()).collect();
        Self {
            ids,
            positions,
            next,
        }
    }

    /// Raw page offset of the identifier at `index`
    pub fn position(&self, index: usize) -> usize {
        self.positions.get(index).copied().unwrap_or(index)
    }
}

/// Source of identifier pages
pub trait ListFetcher: Send + Sync {
    /// Fetches the page at `cursor`
    ///
    /// # Returns
    ///
    /// * `Ok(ListPage)` - A non-empty page
    /// * `Err(FetchError::Exhausted)` - The listing has no more entries
    /// * `Err(FetchError::Transient | FetchError::RateLimited)` - Retry per policy
    fn fetch(&self, cursor: &Cursor) -> impl Future<Output = Result<ListPage, FetchError>> + Send;

    /// Checks that the endpoint can be reached before any work begins
    fn preflight(&self) -> impl Future<Output = Result<(), CrawlError>> + Send {
        async { Ok(()) }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    url: Option<String>,
}

/// Listing fetcher for the JSON search endpoint
///
/// Issues `GET <list-url>?sort=..&range=..&tags=..&start=<offset>&limit=<page_size>`
/// and reads the `url` of every entry in the `data` array.
pub struct HttpListFetcher {
    client: Client,
    source: SourceConfig,
    identities: IdentityPool,
}

impl HttpListFetcher {
    pub fn new(client: Client, source: SourceConfig) -> Self {
        let identities = IdentityPool::new(source.user_agents.clone());
        Self {
            client,
            source,
            identities,
        }
    }

    fn request(&self, start: u64, limit: u32) -> reqwest::RequestBuilder {
        self.client
            .get(&self.source.list_url)
            .header(USER_AGENT, self.identities.pick())
            .query(&[
                ("sort", self.source.sort.as_str()),
                ("range", self.source.range.as_str()),
                ("tags", self.source.tags.as_str()),
            ])
            .query(&[("start", start.to_string()), ("limit", limit.to_string())])
    }
}

impl ListFetcher for HttpListFetcher {
    async fn fetch(&self, cursor: &Cursor) -> Result<ListPage, FetchError> {
        let url = self.source.list_url.as_str();

        let response = self
            .request(cursor.offset, cursor.page_size)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => {}
            StatusClass::RateLimited => {
                return Err(FetchError::RateLimited {
                    url: url.to_string(),
                    status: status.as_u16(),
                })
            }
            StatusClass::NotFound | StatusClass::Transient => {
                return Err(FetchError::Transient {
                    url: url.to_string(),
                    reason: format!("HTTP {}", status.as_u16()),
                })
            }
        }

        let body: ListResponse = response.json().await.map_err(|e| FetchError::Transient {
            url: url.to_string(),
            reason: format!("Undecodable listing: {}", e),
        })?;

        if body.data.is_empty() {
            return Err(FetchError::Exhausted);
        }

        let examined = body.data.len();
        let mut ids = Vec::with_capacity(examined);
        let mut positions = Vec::with_capacity(examined);
        for (position, entry) in body.data.into_iter().enumerate() {
            let Some(raw) = entry.url else {
                tracing::debug!("Dropping listing entry {} without a url", position);
                continue;
            };
            match normalize_identifier(&raw) {
                Ok(id) => {
                    ids.push(id);
                    positions.push(position);
                }
                Err(e) => tracing::debug!("Dropping listing entry {:?}: {}", raw, e),
            }
        }

        Ok(ListPage {
            ids,
            positions,
            next: cursor.advance(examined),
        })
    }

    /// Sends one minimal listing request; only a failure to connect is fatal
    async fn preflight(&self) -> Result<(), CrawlError> {
        match self.request(0, 1).send().await {
            Ok(response) => {
                tracing::debug!(
                    "Listing endpoint reachable (HTTP {})",
                    response.status().as_u16()
                );
                Ok(())
            }
            Err(e) if e.is_connect() || e.is_builder() => Err(CrawlError::Unreachable {
                url: self.source.list_url.clone(),
                message: e.to_string(),
            }),
            Err(e) => {
                tracing::warn!("Listing preflight failed, continuing: {}", e);
                Ok(())
            }
        }
    }
}
