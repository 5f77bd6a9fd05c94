//! Search provider seam
//!
//! The execution loop talks to the remote search API through two traits:
//! - [`SearchProvider`] - opens an authenticated [`SearchSession`]
//! - [`SearchSession`] - runs searches and fetches item details and comments
//!
//! Every session call reports failures as [`UpstreamError`] so the backoff
//! policy can classify them. Implementations:
//! - [`RedditProvider`] - the Reddit OAuth API over `reqwest`
//! - [`StaticProvider`] - canned results for demos and tests

use crate::error::{Result, UpstreamError};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

mod reddit;
mod static_provider;

pub use reddit::RedditProvider;
pub use static_provider::{StaticItem, StaticProvider};

/// Parameters of one search call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Scope to search within (a subreddit)
    pub scope: String,
    /// Query text (a primary entity)
    pub query: String,
    /// Maximum results (None = provider maximum)
    pub limit: Option<u32>,
    /// Recency filter
    pub time_filter: String,
    /// Result ordering
    pub sort: String,
}

/// Lightweight handle to a search hit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    /// Upstream identifier
    pub id: String,
    /// Scope the hit was found in
    pub scope: String,
}

/// Full item as returned by a details fetch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    /// Upstream identifier
    pub id: String,
    /// Scope the item belongs to
    pub scope: String,
    /// Title
    pub title: String,
    /// Item URL
    pub url: String,
    /// Free text body
    pub text: String,
    /// Score
    pub score: i64,
    /// Upvote ratio, if reported
    pub upvote_ratio: Option<f64>,
    /// Creation time (UTC)
    pub created_utc: NaiveDateTime,
}

/// An authenticated connection to the search API
///
/// Sessions are opened once per job run and closed on every exit path.
#[async_trait]
pub trait SearchSession: Send + Sync {
    /// Run a search, paging internally up to `query.limit`
    async fn search(&self, query: &SearchQuery) -> std::result::Result<Vec<ItemRef>, UpstreamError>;

    /// Fetch the full item
    async fn load_details(&self, item: &ItemRef) -> std::result::Result<ItemDetails, UpstreamError>;

    /// Bodies of the item's comment tree, flattened depth-first
    ///
    /// Collapsed "load more" stubs are not expanded.
    async fn comment_bodies(&self, item: &ItemRef) -> std::result::Result<Vec<String>, UpstreamError>;

    /// Release the session
    async fn close(&self);
}

/// Factory for search sessions
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Open a session
    ///
    /// Fails with [`Error::ConfigurationMissing`](crate::error::Error::ConfigurationMissing)
    /// when required credentials are absent.
    async fn open_session(&self) -> Result<Box<dyn SearchSession>>;

    /// Provider name for logs
    fn name(&self) -> &str;
}
