//! Job lifecycle control: pause, resume, cancel, progress.
//!
//! These only flip state under the lock. The execution loop observes the
//! change at its next check point (every unit and every item).

use crate::error::{Error, Result};
use crate::types::{Event, JobStatus, Progress};

use super::JobController;

impl JobController {
    /// Pause the running job
    ///
    /// The loop parks at its next check point until [`resume`](Self::resume)
    /// or [`cancel`](Self::cancel).
    ///
    /// # Errors
    ///
    /// [`Error::IllegalState`] unless the job is running.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use search_harvest::*;
    /// # async fn example(controller: JobController) -> Result<()> {
    /// controller.pause().await?;
    /// assert_eq!(controller.progress().await.status, JobStatus::Paused);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn pause(&self) -> Result<()> {
        let job_id = {
            let mut state = self.state.lock().await;
            if state.status != JobStatus::Running {
                return Err(Error::illegal_state("pause", state.status));
            }
            state.set_status(JobStatus::Paused, "Paused");
            state.job_id.clone().unwrap_or_default()
        };

        tracing::info!(job_id = %job_id, "Job paused");
        self.emit_event(Event::StatusChanged {
            job_id,
            status: JobStatus::Paused,
        });
        Ok(())
    }

    /// Resume a paused job
    ///
    /// # Errors
    ///
    /// [`Error::IllegalState`] unless the job is paused.
    pub async fn resume(&self) -> Result<()> {
        let job_id = {
            let mut state = self.state.lock().await;
            if state.status != JobStatus::Paused {
                return Err(Error::illegal_state("resume", state.status));
            }
            state.set_status(JobStatus::Running, "Resumed");
            state.job_id.clone().unwrap_or_default()
        };

        tracing::info!(job_id = %job_id, "Job resumed");
        self.emit_event(Event::StatusChanged {
            job_id,
            status: JobStatus::Running,
        });
        Ok(())
    }

    /// Request cancellation of a running or paused job
    ///
    /// The status becomes `cancelling` immediately and `cancelled` once the
    /// loop observes the request. A backoff sleep in progress is cut short.
    ///
    /// # Errors
    ///
    /// [`Error::IllegalState`] unless the job is running or paused.
    pub async fn cancel(&self) -> Result<()> {
        let job_id = {
            let mut state = self.state.lock().await;
            if !matches!(state.status, JobStatus::Running | JobStatus::Paused) {
                return Err(Error::illegal_state("cancel", state.status));
            }
            state.cancel_requested = true;
            state.cancel.cancel();
            state.set_status(JobStatus::Cancelling, "Cancelling...");
            state.job_id.clone().unwrap_or_default()
        };

        tracing::info!(job_id = %job_id, "Job cancellation requested");
        self.emit_event(Event::StatusChanged {
            job_id,
            status: JobStatus::Cancelling,
        });
        Ok(())
    }

    /// Consistent snapshot of the job's progress
    pub async fn progress(&self) -> Progress {
        self.state.lock().await.snapshot()
    }
}
