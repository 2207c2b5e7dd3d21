//! Crawler module for listing pagination and detail fetching
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with status classification and identity rotation
//! - Detail page parsing into typed records
//! - The retry policy shared by list and detail fetches
//! - The bounded worker pool and the coordinating crawl loop
//!
//! [`run_crawl`] is the entry point for a complete crawl.

mod coordinator;
mod detail;
mod fetcher;
mod listing;
mod parser;
mod retry;
mod scheduler;

pub use coordinator::{run_crawl, Coordinator, HttpCoordinator};
pub use detail::{DetailFetcher, HttpDetailFetcher};
pub use fetcher::{build_http_client, classify_status, FetchError, IdentityPool, StatusClass};
pub use listing::{HttpListFetcher, ListFetcher, ListPage};
pub use parser::{DetailOutcome, DocumentParser, MoviePageParser, SkipReason};
pub use retry::{ErrorKind, RetryDecision, RetryPolicy};
pub use scheduler::{run_task, FetchTask, TaskOutcome, TaskReport, WorkerPool};

