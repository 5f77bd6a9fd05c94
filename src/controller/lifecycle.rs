//! Job lifecycle: start, resume from checkpoint, terminal transitions, shutdown.

use crate::error::{Error, Result};
use crate::storage::JobLayout;
use crate::types::{Event, JobRequest, JobStatus, SearchParams};
use crate::utils::{assign_slugs, dedupe_preserving_order, new_job_id};
use crate::writer::ChunkedWriter;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

use super::JobController;
use super::state::RunPlan;

impl JobController {
    /// Start a new job
    ///
    /// Validates the request, derives the job id and the target→slug mapping,
    /// and launches the execution loop. Returns the job id.
    ///
    /// Unset request fields fall back to [`JobConfig`](crate::config::JobConfig)
    /// defaults; sub-targets are deduplicated keeping first occurrences.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] if a job is running, paused or cancelling (state untouched)
    /// - [`Error::Config`] if no usable target was supplied
    /// - [`Error::ShuttingDown`] after [`graceful_shutdown`](Self::graceful_shutdown)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use search_harvest::*;
    /// # async fn example(controller: JobController) -> Result<()> {
    /// let job_id = controller
    ///     .start(JobRequest::new(["LeBron James", "Nikola Jokic"], ["nba"]))
    ///     .await?;
    /// println!("started {}", job_id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start(&self, request: JobRequest) -> Result<String> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        self.reject_if_active().await?;

        let targets: Vec<String> = request
            .targets
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if targets.is_empty() {
            return Err(Error::Config {
                message: "at least one target is required".to_string(),
                key: Some("targets".to_string()),
            });
        }

        let mut sub_targets = dedupe_preserving_order(
            request
                .sub_targets
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty()),
        );
        if sub_targets.is_empty() {
            sub_targets.push(self.config.job.default_sub_target.clone());
        }

        let defaults = &self.config.job;
        let params = SearchParams {
            limit: request.limit.or(defaults.default_limit),
            time_filter: request
                .time_filter
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| defaults.default_time_filter.clone()),
            sort: request
                .sort
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| defaults.default_sort.clone()),
        };

        let slugs = assign_slugs(&targets);
        let job_id = self.fresh_job_id().await?;

        let plan = RunPlan {
            job_id,
            targets,
            sub_targets,
            params,
            slugs,
            start: Default::default(),
            completed_units: 0,
            resumed: false,
            cancel: CancellationToken::new(),
        };
        self.launch(plan).await
    }

    /// Continue a job from its saved checkpoint
    ///
    /// Parameters and the slug mapping are restored verbatim, part counters
    /// are recovered from storage, and the loop starts at the checkpointed unit.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] if a job is active
    /// - [`Error::NotFound`] if `job_id` has no checkpoint
    pub async fn resume_from_checkpoint(&self, job_id: &str) -> Result<String> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        self.reject_if_active().await?;

        let checkpoint = self.load_checkpoint(job_id).await?;
        if checkpoint.targets.is_empty()
            || checkpoint.sub_targets.is_empty()
            || checkpoint.slugs.len() != checkpoint.targets.len()
        {
            return Err(Error::Config {
                message: format!("checkpoint for {} is inconsistent", job_id),
                key: Some("job_id".to_string()),
            });
        }

        tracing::info!(
            job_id = %job_id,
            completed_units = checkpoint.completed_units,
            "Resuming job from checkpoint"
        );
        self.launch(RunPlan::from_checkpoint(checkpoint)).await
    }

    /// Set `finished` unless the job already ended as `cancelled` or `error`
    ///
    /// Returns whether the status changed.
    pub async fn mark_finished(&self) -> bool {
        let job_id = {
            let mut state = self.state.lock().await;
            if matches!(
                state.status,
                JobStatus::Cancelled | JobStatus::Error | JobStatus::Idle
            ) {
                return false;
            }
            state.set_status(JobStatus::Finished, "Finished");
            state.job_id.clone().unwrap_or_default()
        };

        tracing::info!(job_id = %job_id, "Job finished");
        self.emit_event(Event::StatusChanged {
            job_id: job_id.clone(),
            status: JobStatus::Finished,
        });
        self.emit_event(Event::JobFinished { job_id });
        true
    }

    /// Wait for the execution loop task to exit
    pub async fn wait_until_stopped(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Execution loop task panicked");
        }
    }

    /// Stop accepting jobs, stop the loop, and persist what is buffered
    ///
    /// Requests cancellation of an active job and waits up to
    /// [`JobConfig::shutdown_timeout`](crate::config::JobConfig::shutdown_timeout)
    /// for the loop to exit. Every non-empty buffer is then flushed and a
    /// checkpoint saved, so the job can be continued with
    /// [`resume_from_checkpoint`](Self::resume_from_checkpoint). Failures are
    /// logged rather than returned.
    pub async fn graceful_shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");
        self.accepting_new.store(false, Ordering::SeqCst);

        {
            let mut state = self.state.lock().await;
            if matches!(state.status, JobStatus::Running | JobStatus::Paused) {
                state.cancel_requested = true;
                state.cancel.cancel();
                state.set_status(JobStatus::Cancelling, "Shutting down");
            }
        }

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let timeout = self.config.job.shutdown_timeout;
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => tracing::info!("Execution loop stopped"),
                Ok(Err(e)) => tracing::error!(error = %e, "Execution loop task panicked"),
                Err(_) => tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    "Execution loop did not stop within timeout"
                ),
            }
        }

        let flushed = {
            let mut guard = self.writer.lock().await;
            match guard.as_mut() {
                Some(writer) => writer.flush_all().await,
                None => Ok(Vec::new()),
            }
        };
        match flushed {
            Ok(parts) => {
                tracing::info!(parts = parts.len(), "Flushed buffered rows");
                for part in parts {
                    self.emit_part_flushed(part);
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to flush buffered rows during shutdown"),
        }

        let checkpoint = {
            let state = self.state.lock().await;
            if state.status == JobStatus::Finished {
                None
            } else {
                state.checkpoint()
            }
        };
        if let Some(checkpoint) = checkpoint {
            match self.save_checkpoint(&checkpoint).await {
                Ok(()) => tracing::info!(job_id = %checkpoint.job_id, "Shutdown checkpoint saved"),
                Err(e) => tracing::error!(error = %e, "Failed to save shutdown checkpoint"),
            }
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn reject_if_active(&self) -> Result<()> {
        if self.state.lock().await.status.is_active() {
            return Err(Error::Busy);
        }
        Ok(())
    }

    /// Timestamp-derived id not used by the previous job or by stored output
    async fn fresh_job_id(&self) -> Result<String> {
        let base = new_job_id();
        let previous = self.state.lock().await.job_id.clone();

        let mut candidate = base.clone();
        let mut suffix = 2;
        loop {
            let layout = JobLayout::new(&self.config.storage.results_prefix, &candidate);
            let taken = previous.as_deref() == Some(candidate.as_str())
                || self
                    .store
                    .exists(&JobLayout::checkpoint(
                        &self.config.storage.checkpoint_prefix,
                        &candidate,
                    ))
                    .await?
                || !self
                    .store
                    .list_prefix(&format!("{}/", layout.job_prefix()))
                    .await?
                    .is_empty();
            if !taken {
                return Ok(candidate);
            }
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }
    }

    /// Install the job's state and writer, then spawn the loop
    async fn launch(&self, plan: RunPlan) -> Result<String> {
        let layout = JobLayout::new(&self.config.storage.results_prefix, &plan.job_id);

        // Lock order: writer, then state
        let mut writer = self.writer.lock().await;
        {
            let mut state = self.state.lock().await;
            if state.status.is_active() {
                return Err(Error::Busy);
            }
            state.reset_for(&plan, layout.clone());
        }
        *writer = Some(ChunkedWriter::new(
            self.store.clone(),
            layout,
            self.config.storage.chunk_rows,
            self.config.storage.compose_fan_in,
        ));
        drop(writer);

        let job_id = plan.job_id.clone();
        tracing::info!(
            job_id = %job_id,
            targets = plan.targets.len(),
            sub_targets = plan.sub_targets.len(),
            total_units = plan.total_units(),
            resumed = plan.resumed,
            "Job started"
        );
        self.emit_event(Event::JobStarted {
            job_id: job_id.clone(),
            total_units: plan.total_units(),
            resumed: plan.resumed,
        });
        self.emit_event(Event::StatusChanged {
            job_id: job_id.clone(),
            status: JobStatus::Running,
        });

        let controller = self.clone();
        let handle = tokio::spawn(controller.run_job(plan));
        *self.task.lock().await = Some(handle);

        Ok(job_id)
    }

    /// Loop-side finish for `job_id`
    pub(super) async fn finish(&self, job_id: &str) {
        if self.state.lock().await.is_job(job_id) {
            self.mark_finished().await;
        }
    }

    pub(super) async fn mark_cancelled(&self, job_id: &str) {
        {
            let mut state = self.state.lock().await;
            if !state.is_job(job_id) || state.status == JobStatus::Error {
                return;
            }
            state.set_status(JobStatus::Cancelled, "Cancelled");
        }

        tracing::info!(job_id = %job_id, "Job cancelled");
        self.emit_event(Event::StatusChanged {
            job_id: job_id.to_string(),
            status: JobStatus::Cancelled,
        });
    }

    pub(super) async fn fail(&self, job_id: &str, error: &Error) {
        tracing::error!(job_id = %job_id, error = %error, "Job failed");
        {
            let mut state = self.state.lock().await;
            if !state.is_job(job_id) || state.status == JobStatus::Cancelled {
                return;
            }
            state.set_status(JobStatus::Error, format!("Error: {}", error));
        }

        self.emit_event(Event::StatusChanged {
            job_id: job_id.to_string(),
            status: JobStatus::Error,
        });
        self.emit_event(Event::JobFailed {
            job_id: job_id.to_string(),
            error: error.to_string(),
        });
    }
}
