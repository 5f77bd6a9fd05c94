//! Core types and events for search-harvest

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Job status
///
/// ```text
/// idle → running ⇄ paused
///          │         │
///          ├─────────┴→ cancelling → cancelled
///          ├→ finished
///          └→ error
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// No job has been started in this process
    #[default]
    Idle,
    /// The execution loop is working through units
    Running,
    /// The loop is parked at its next check point
    Paused,
    /// Cancel requested, waiting for the loop to observe it
    Cancelling,
    /// The loop observed the cancel request and exited
    Cancelled,
    /// Every unit completed
    Finished,
    /// The loop exited on an unrecoverable failure
    Error,
}

impl JobStatus {
    /// True while a job owns the process (start must be rejected)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Running | JobStatus::Paused | JobStatus::Cancelling
        )
    }

    /// Lowercase name as exposed over the API
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Finished => "finished",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search parameters shared by every unit of a job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SearchParams {
    /// Maximum results per search (None = provider maximum)
    pub limit: Option<u32>,
    /// Recency filter (e.g., "all", "year", "month")
    pub time_filter: String,
    /// Result ordering (e.g., "new", "relevance", "top")
    pub sort: String,
}

/// Parameters for starting a job
///
/// Unset optional fields fall back to [`JobConfig`](crate::config::JobConfig) defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct JobRequest {
    /// Primary entities to search for (search queries)
    pub targets: Vec<String>,
    /// Secondary entities to search within (search scopes)
    #[serde(default)]
    pub sub_targets: Vec<String>,
    /// Maximum results per search
    #[serde(default)]
    pub limit: Option<u32>,
    /// Recency filter
    #[serde(default)]
    pub time_filter: Option<String>,
    /// Result ordering
    #[serde(default)]
    pub sort: Option<String>,
}

impl JobRequest {
    /// Request over the given targets and sub-targets with default search parameters
    pub fn new(
        targets: impl IntoIterator<Item = impl Into<String>>,
        sub_targets: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            sub_targets: sub_targets.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// One collected search result, flattened for CSV output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResultRow {
    /// Scope the item was found in
    pub subreddit: String,
    /// Upstream item identifier
    pub submission_id: String,
    /// Item title
    pub title: String,
    /// Item URL
    pub submission_url: String,
    /// Free text body
    pub submission_text: String,
    /// Score
    pub score: i64,
    /// Upvote ratio, when the API reports one
    pub upvote_ratio: Option<f64>,
    /// Number of flattened comments
    pub num_comments: u64,
    /// Creation time (UTC)
    #[schema(value_type = String)]
    pub created_utc: NaiveDateTime,
    /// Primary entity that produced this row
    pub search_player: String,
    /// Flattened comment bodies
    pub comments: Vec<String>,
}

/// Unit position: the next (primary, secondary) pair to execute
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Cursor {
    /// Index into the job's targets
    pub primary_index: usize,
    /// Index into the job's sub-targets
    pub secondary_index: usize,
}

impl Cursor {
    /// Row-major position of this cursor given the number of sub-targets
    pub fn unit_index(&self, sub_target_count: usize) -> usize {
        self.primary_index * sub_target_count + self.secondary_index
    }
}

/// Primary entity and the slug its output is written under
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SlugAssignment {
    /// Primary entity name as supplied
    pub target: String,
    /// Collision-free slug
    pub slug: String,
}

/// Durable resume point for a job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Checkpoint {
    /// Job identifier
    pub job_id: String,
    /// Primary entities in order
    pub targets: Vec<String>,
    /// Secondary entities in order
    pub sub_targets: Vec<String>,
    /// Search parameters
    pub params: SearchParams,
    /// Slug mapping as assigned at job start
    pub slugs: Vec<SlugAssignment>,
    /// Unit about to run when the checkpoint was taken
    pub cursor: Cursor,
    /// Units completed before `cursor`
    pub completed_units: usize,
    /// When the checkpoint was written
    #[schema(value_type = String)]
    pub saved_at: DateTime<Utc>,
}

/// Consistent snapshot of job progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Progress {
    /// Current job id, if a job has been started
    pub job_id: Option<String>,
    /// Current status
    pub status: JobStatus,
    /// Human-readable status message
    pub message: String,
    /// Total units (targets × sub-targets)
    pub total_units: usize,
    /// Units fully processed or skipped
    pub completed_units: usize,
    /// completed / total × 100, rounded to two decimals
    pub percent: f64,
    /// Row-major index of the unit currently executing
    pub current_unit_index: usize,
    /// When the job state last changed
    #[schema(value_type = Option<String>)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Output stream of one primary entity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EntityResult {
    /// Primary entity
    pub target: String,
    /// Slug the output is written under
    pub slug: String,
    /// Path of the composed artifact
    pub final_artifact_path: String,
    /// Parts flushed so far
    pub part_count: usize,
}

/// Result listing for the current job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResultsListing {
    /// Current job id (None before the first start)
    pub job_id: Option<String>,
    /// Storage prefix of the current job
    pub prefix: Option<String>,
    /// Current status
    pub status: JobStatus,
    /// Current status message
    pub message: String,
    /// Configured flush threshold
    pub chunk_rows: usize,
    /// One entry per primary entity, in target order
    pub files: Vec<EntityResult>,
}

/// Job lifecycle events
///
/// Broadcast to every subscriber; slow subscribers may observe `Lagged`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was started or resumed from a checkpoint
    JobStarted {
        /// Job id
        job_id: String,
        /// Total units
        total_units: usize,
        /// True when resumed from a checkpoint
        resumed: bool,
    },
    /// Status transition
    StatusChanged {
        /// Job id
        job_id: String,
        /// New status
        status: JobStatus,
    },
    /// A unit finished
    UnitCompleted {
        /// Job id
        job_id: String,
        /// Unit position
        cursor: Cursor,
        /// Rows written for the unit
        rows: usize,
    },
    /// A unit was abandoned as permanently inaccessible
    UnitSkipped {
        /// Job id
        job_id: String,
        /// Unit position
        cursor: Cursor,
        /// Why it was skipped
        reason: String,
    },
    /// A part object was written
    PartFlushed {
        /// Entity slug
        slug: String,
        /// Part number (1-based)
        part: usize,
        /// Rows in the part
        rows: usize,
    },
    /// The loop is sleeping before a retry
    Backoff {
        /// Human-readable reason
        reason: String,
        /// Sleep length in milliseconds
        delay_ms: u64,
        /// Retry attempt number (1-based)
        attempt: u32,
    },
    /// Every unit completed
    JobFinished {
        /// Job id
        job_id: String,
    },
    /// The loop exited with an error
    JobFailed {
        /// Job id
        job_id: String,
        /// Captured error message
        error: String,
    },
}
