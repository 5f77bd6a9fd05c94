//! Locked job state and the immutable run plan handed to the loop.

use crate::storage::JobLayout;
use crate::types::{Checkpoint, Cursor, JobStatus, Progress, SearchParams, SlugAssignment};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

/// Mutable state of the live job, guarded by the controller's lock
#[derive(Debug, Default)]
pub(crate) struct JobState {
    pub(crate) job_id: Option<String>,
    pub(crate) status: JobStatus,
    pub(crate) message: String,
    pub(crate) cancel_requested: bool,
    pub(crate) total_units: usize,
    pub(crate) completed_units: usize,
    pub(crate) current_unit_index: usize,
    pub(crate) targets: Vec<String>,
    pub(crate) sub_targets: Vec<String>,
    pub(crate) params: Option<SearchParams>,
    pub(crate) slugs: Vec<SlugAssignment>,
    pub(crate) layout: Option<JobLayout>,
    /// Unit about to run (or running)
    pub(crate) cursor: Cursor,
    pub(crate) cancel: CancellationToken,
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl JobState {
    /// Advance `updated_at`, never moving it backwards
    pub(crate) fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = Some(match self.updated_at {
            Some(previous) if previous > now => previous,
            _ => now,
        });
    }

    pub(crate) fn set_status(&mut self, status: JobStatus, message: impl Into<String>) {
        self.status = status;
        self.message = message.into();
        self.touch();
    }

    /// Replace everything with a freshly started job
    pub(crate) fn reset_for(&mut self, plan: &RunPlan, layout: JobLayout) {
        *self = JobState {
            job_id: Some(plan.job_id.clone()),
            status: JobStatus::Running,
            message: "Scrape started".to_string(),
            cancel_requested: false,
            total_units: plan.total_units(),
            completed_units: plan.completed_units,
            current_unit_index: plan.start.unit_index(plan.sub_targets.len()),
            targets: plan.targets.clone(),
            sub_targets: plan.sub_targets.clone(),
            params: Some(plan.params.clone()),
            slugs: plan.slugs.clone(),
            layout: Some(layout),
            cursor: plan.start,
            cancel: plan.cancel.clone(),
            updated_at: self.updated_at,
        };
        self.touch();
    }

    /// Whether `job_id` still owns this state
    pub(crate) fn is_job(&self, job_id: &str) -> bool {
        self.job_id.as_deref() == Some(job_id)
    }

    pub(crate) fn snapshot(&self) -> Progress {
        let percent = if self.total_units == 0 {
            0.0
        } else {
            let raw = self.completed_units as f64 / self.total_units as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        };

        Progress {
            job_id: self.job_id.clone(),
            status: self.status,
            message: self.message.clone(),
            total_units: self.total_units,
            completed_units: self.completed_units,
            percent,
            current_unit_index: self.current_unit_index,
            updated_at: self.updated_at,
        }
    }

    /// Checkpoint at the current cursor, if a job has been started
    pub(crate) fn checkpoint(&self) -> Option<Checkpoint> {
        Some(Checkpoint {
            job_id: self.job_id.clone()?,
            targets: self.targets.clone(),
            sub_targets: self.sub_targets.clone(),
            params: self.params.clone()?,
            slugs: self.slugs.clone(),
            cursor: self.cursor,
            completed_units: self.completed_units,
            saved_at: Utc::now(),
        })
    }
}

/// Everything the execution loop needs, fixed at start
#[derive(Clone, Debug)]
pub(crate) struct RunPlan {
    pub(crate) job_id: String,
    pub(crate) targets: Vec<String>,
    pub(crate) sub_targets: Vec<String>,
    pub(crate) params: SearchParams,
    pub(crate) slugs: Vec<SlugAssignment>,
    /// First unit to run
    pub(crate) start: Cursor,
    /// Units already completed before `start`
    pub(crate) completed_units: usize,
    /// True when restored from a checkpoint
    pub(crate) resumed: bool,
    pub(crate) cancel: CancellationToken,
}

impl RunPlan {
    pub(crate) fn total_units(&self) -> usize {
        self.targets.len() * self.sub_targets.len()
    }

    pub(crate) fn from_checkpoint(checkpoint: Checkpoint) -> Self {
        RunPlan {
            job_id: checkpoint.job_id,
            targets: checkpoint.targets,
            sub_targets: checkpoint.sub_targets,
            params: checkpoint.params,
            slugs: checkpoint.slugs,
            start: checkpoint.cursor,
            completed_units: checkpoint.completed_units,
            resumed: true,
            cancel: CancellationToken::new(),
        }
    }
}
