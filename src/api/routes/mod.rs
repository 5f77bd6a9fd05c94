//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`scrape`] - Starting and steering the job, checkpoints
//! - [`results`] - Result listing and artifact downloads
//! - [`system`] - Health, events, OpenAPI

use serde::{Deserialize, Serialize};

mod results;
mod scrape;
mod system;

pub use results::*;
pub use scrape::*;
pub use system::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// One sub-target or a list of them
#[derive(Debug, Clone, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum OneOrMany {
    /// A single value
    One(String),
    /// Several values
    Many(Vec<String>),
}

impl OneOrMany {
    /// Flatten into a list
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// Request body for POST /scrape
///
/// Every field is optional. Missing `players` fall back to the configured
/// targets file; missing sub-targets fall back to the default sub-target.
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartScrapeRequest {
    /// Names to search for
    #[serde(default)]
    pub players: Option<Vec<String>>,
    /// Subreddits to search in (array or single string)
    #[serde(default)]
    pub subreddits: Option<OneOrMany>,
    /// Single subreddit, used when `subreddits` is absent
    #[serde(default)]
    pub subreddit: Option<String>,
    /// Maximum results per search
    #[serde(default)]
    pub search_limit: Option<u32>,
    /// Recency filter (e.g. "all", "year")
    #[serde(default)]
    pub time_filter: Option<String>,
    /// Result ordering (e.g. "new", "top")
    #[serde(default)]
    pub sort: Option<String>,
}

/// Request body for POST /scrape/resume-checkpoint
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ResumeCheckpointRequest {
    /// Job to continue (e.g. "job-2024-05-01T12-00-00")
    #[serde(default)]
    pub job_id: Option<String>,
}

/// Acknowledgement returned by job control endpoints
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ActionResponse {
    /// Outcome or resulting status (e.g. "accepted", "paused")
    pub status: String,
    /// Human-readable message
    pub message: String,
    /// Job the action applied to, when one was started or resumed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl ActionResponse {
    pub(crate) fn new(status: &str, message: impl Into<String>) -> Self {
        Self {
            status: status.to_string(),
            message: message.into(),
            job_id: None,
        }
    }

    pub(crate) fn with_job_id(mut self, job_id: String) -> Self {
        self.job_id = Some(job_id);
        self
    }
}

/// Response body for GET /scrape/checkpoints
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CheckpointList {
    /// Job ids that have a saved checkpoint
    pub checkpoints: Vec<String>,
}

/// Response body for GET /scrape/results/:slug.url
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SignedUrlResponse {
    /// Time-limited download URL
    pub url: String,
}
