//! The execution loop: units in row-major order, items within each unit.
//!
//! Check points (pause parking and cancel detection) sit before every unit and
//! before every item. The job state lock is only taken for short updates;
//! upstream calls and storage writes happen with it released.

use crate::error::{Error, Result};
use crate::retry::{BackoffObserver, Outcome, call_with_backoff};
use crate::search::{ItemDetails, ItemRef, SearchQuery, SearchSession};
use crate::types::{Cursor, Event, JobStatus, ResultRow};
use crate::writer::FlushedPart;
use async_trait::async_trait;
use std::time::Duration;

use super::JobController;
use super::state::RunPlan;

/// How the loop ended, short of an error
pub(super) enum LoopExit {
    Completed,
    Cancelled,
}

enum Gate {
    Proceed,
    Cancelled,
}

enum UnitOutcome {
    Done(usize),
    Skipped(String),
    Cancelled,
}

enum ItemOutcome {
    Row(Box<ResultRow>),
    Skipped,
    Cancelled,
}

/// Reports backoff sleeps into the job status message
struct LoopObserver<'a> {
    controller: &'a JobController,
    job_id: &'a str,
}

#[async_trait]
impl BackoffObserver for LoopObserver<'_> {
    async fn on_backoff(&self, reason: &str, delay: Duration, attempt: u32) {
        {
            let mut state = self.controller.state.lock().await;
            if state.is_job(self.job_id) && state.status == JobStatus::Running {
                state.message = format!("{}: sleeping ~{}s", reason, delay.as_secs());
                state.touch();
            }
        }
        self.controller.emit_event(Event::Backoff {
            reason: reason.to_string(),
            delay_ms: delay.as_millis() as u64,
            attempt,
        });
    }
}

impl JobController {
    /// Body of the spawned loop task
    ///
    /// Opens the search session, runs every unit, and records the terminal
    /// status. The session is closed on every exit path.
    pub(super) async fn run_job(self, plan: RunPlan) {
        let job_id = plan.job_id.clone();
        tracing::info!(
            job_id = %job_id,
            total_units = plan.total_units(),
            start_primary = plan.start.primary_index,
            start_secondary = plan.start.secondary_index,
            resumed = plan.resumed,
            "Execution loop started"
        );

        let session = match self.provider.open_session().await {
            Ok(session) => session,
            Err(e) => {
                self.fail(&job_id, &e).await;
                return;
            }
        };

        let result = self.execute(&plan, session.as_ref()).await;
        session.close().await;

        match result {
            Ok(LoopExit::Completed) => {
                if let Err(e) = self.save_final_checkpoint(&plan).await {
                    self.fail(&job_id, &e).await;
                    return;
                }
                self.finish(&job_id).await;
            }
            Ok(LoopExit::Cancelled) => self.mark_cancelled(&job_id).await,
            Err(e) => self.fail(&job_id, &e).await,
        }
    }

    async fn execute(&self, plan: &RunPlan, session: &dyn SearchSession) -> Result<LoopExit> {
        self.prepare_outputs(plan).await?;
        let observer = LoopObserver {
            controller: self,
            job_id: &plan.job_id,
        };

        for (primary_index, assignment) in plan.slugs.iter().enumerate() {
            if primary_index < plan.start.primary_index {
                continue;
            }
            let first_secondary = if primary_index == plan.start.primary_index {
                plan.start.secondary_index
            } else {
                0
            };

            for (secondary_index, sub_target) in
                plan.sub_targets.iter().enumerate().skip(first_secondary)
            {
                let cursor = Cursor {
                    primary_index,
                    secondary_index,
                };

                if let Gate::Cancelled = self.wait_while_paused(&plan.job_id).await {
                    return Ok(LoopExit::Cancelled);
                }
                self.begin_unit(plan, cursor, &assignment.target, sub_target)
                    .await?;

                let query = SearchQuery {
                    scope: sub_target.clone(),
                    query: assignment.target.clone(),
                    limit: plan.params.limit,
                    time_filter: plan.params.time_filter.clone(),
                    sort: plan.params.sort.clone(),
                };

                match self
                    .run_unit(plan, session, &observer, &query, &assignment.slug)
                    .await?
                {
                    UnitOutcome::Done(rows) => {
                        // A unit only counts once its rows are durable, ahead of the next checkpoint
                        self.flush_entity(&plan.job_id, &assignment.slug).await?;
                        self.complete_unit(&plan.job_id, cursor, rows).await
                    }
                    UnitOutcome::Skipped(reason) => {
                        self.flush_entity(&plan.job_id, &assignment.slug).await?;
                        self.skip_unit(&plan.job_id, cursor, reason).await
                    }
                    UnitOutcome::Cancelled => return Ok(LoopExit::Cancelled),
                }
            }
        }

        Ok(LoopExit::Completed)
    }

    /// Seed buffers and headers; on resume, recover part counters first
    async fn prepare_outputs(&self, plan: &RunPlan) -> Result<()> {
        let slugs: Vec<String> = plan.slugs.iter().map(|s| s.slug.clone()).collect();
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .filter(|w| w.layout().job_id() == plan.job_id)
            .ok_or_else(|| Error::Other(format!("no writer for job {}", plan.job_id)))?;

        if plan.resumed {
            writer.restore_part_counts(&slugs).await?;
        }
        writer.write_headers(&slugs).await
    }

    async fn run_unit(
        &self,
        plan: &RunPlan,
        session: &dyn SearchSession,
        observer: &LoopObserver<'_>,
        query: &SearchQuery,
        slug: &str,
    ) -> Result<UnitOutcome> {
        let retry = &self.config.retry;

        let items = match call_with_backoff(retry, observer, &plan.cancel, || session.search(query))
            .await?
        {
            Outcome::Completed(items) => items,
            Outcome::Skipped(e) => return Ok(UnitOutcome::Skipped(e.to_string())),
            Outcome::Interrupted => return Ok(UnitOutcome::Cancelled),
        };

        let mut rows = 0;
        for item in &items {
            if let Gate::Cancelled = self.wait_while_paused(&plan.job_id).await {
                return Ok(UnitOutcome::Cancelled);
            }

            match self.fetch_item(plan, session, observer, item, query).await? {
                ItemOutcome::Row(row) => {
                    self.write_row(&plan.job_id, slug, *row).await?;
                    rows += 1;
                }
                ItemOutcome::Skipped => {}
                ItemOutcome::Cancelled => return Ok(UnitOutcome::Cancelled),
            }
        }

        Ok(UnitOutcome::Done(rows))
    }

    /// Details and comments of one search hit, each under the backoff policy
    ///
    /// An inaccessible item is skipped; inaccessible comments leave the row
    /// with an empty comment list.
    async fn fetch_item(
        &self,
        plan: &RunPlan,
        session: &dyn SearchSession,
        observer: &LoopObserver<'_>,
        item: &ItemRef,
        query: &SearchQuery,
    ) -> Result<ItemOutcome> {
        let retry = &self.config.retry;

        let details =
            match call_with_backoff(retry, observer, &plan.cancel, || session.load_details(item))
                .await?
            {
                Outcome::Completed(details) => details,
                Outcome::Skipped(e) => {
                    tracing::warn!(item = %item.id, error = %e, "Item inaccessible, skipping");
                    return Ok(ItemOutcome::Skipped);
                }
                Outcome::Interrupted => return Ok(ItemOutcome::Cancelled),
            };

        let comments =
            match call_with_backoff(retry, observer, &plan.cancel, || session.comment_bodies(item))
                .await?
            {
                Outcome::Completed(comments) => comments,
                Outcome::Skipped(e) => {
                    tracing::warn!(item = %item.id, error = %e, "Comments inaccessible");
                    Vec::new()
                }
                Outcome::Interrupted => return Ok(ItemOutcome::Cancelled),
            };

        Ok(ItemOutcome::Row(Box::new(build_row(
            details,
            comments,
            &query.scope,
            &query.query,
        ))))
    }

    /// Park while paused; report whether the loop must stop
    async fn wait_while_paused(&self, job_id: &str) -> Gate {
        loop {
            {
                let state = self.state.lock().await;
                if state.cancel_requested || !state.is_job(job_id) {
                    return Gate::Cancelled;
                }
                if state.status != JobStatus::Paused {
                    return Gate::Proceed;
                }
            }
            tokio::time::sleep(self.config.job.pause_poll_interval).await;
        }
    }

    /// Record the unit about to run and persist it as the resume point
    async fn begin_unit(
        &self,
        plan: &RunPlan,
        cursor: Cursor,
        target: &str,
        sub_target: &str,
    ) -> Result<()> {
        let checkpoint = {
            let mut state = self.state.lock().await;
            state.cursor = cursor;
            state.current_unit_index = cursor.unit_index(plan.sub_targets.len());
            if state.status == JobStatus::Running {
                state.message = format!("Searching '{}' in r/{}", target, sub_target);
            }
            state.touch();
            state.checkpoint()
        };

        tracing::debug!(
            job_id = %plan.job_id,
            unit = cursor.unit_index(plan.sub_targets.len()),
            target = %target,
            sub_target = %sub_target,
            "Starting unit"
        );

        if let Some(checkpoint) = checkpoint {
            self.save_checkpoint(&checkpoint).await?;
        }
        Ok(())
    }

    async fn complete_unit(&self, job_id: &str, cursor: Cursor, rows: usize) {
        {
            let mut state = self.state.lock().await;
            if !state.is_job(job_id) {
                return;
            }
            state.completed_units = (state.completed_units + 1).min(state.total_units);
            if state.status == JobStatus::Running {
                state.message = format!(
                    "Completed {}/{}",
                    state.completed_units, state.total_units
                );
            }
            state.touch();
        }

        self.emit_event(Event::UnitCompleted {
            job_id: job_id.to_string(),
            cursor,
            rows,
        });
    }

    async fn skip_unit(&self, job_id: &str, cursor: Cursor, reason: String) {
        tracing::warn!(
            job_id = %job_id,
            primary = cursor.primary_index,
            secondary = cursor.secondary_index,
            reason = %reason,
            "Unit skipped"
        );
        {
            let mut state = self.state.lock().await;
            if !state.is_job(job_id) {
                return;
            }
            state.completed_units = (state.completed_units + 1).min(state.total_units);
            if state.status == JobStatus::Running {
                state.message = format!(
                    "Skipped inaccessible unit ({}/{})",
                    state.completed_units, state.total_units
                );
            }
            state.touch();
        }

        self.emit_event(Event::UnitSkipped {
            job_id: job_id.to_string(),
            cursor,
            reason,
        });
    }

    async fn write_row(&self, job_id: &str, slug: &str, row: ResultRow) -> Result<()> {
        let flushed = {
            let mut guard = self.writer.lock().await;
            let writer = guard
                .as_mut()
                .filter(|w| w.layout().job_id() == job_id)
                .ok_or_else(|| Error::Other(format!("no writer for job {}", job_id)))?;
            writer.write(slug, row).await?
        };

        if let Some(part) = flushed {
            self.emit_part_flushed(part);
        }
        Ok(())
    }

    async fn flush_entity(&self, job_id: &str, slug: &str) -> Result<()> {
        let flushed = {
            let mut guard = self.writer.lock().await;
            match guard.as_mut().filter(|w| w.layout().job_id() == job_id) {
                Some(writer) => writer.flush(slug).await?,
                None => None,
            }
        };

        if let Some(part) = flushed {
            self.emit_part_flushed(part);
        }
        Ok(())
    }

    /// Checkpoint past the last unit so a resume finishes immediately
    async fn save_final_checkpoint(&self, plan: &RunPlan) -> Result<()> {
        let checkpoint = {
            let mut state = self.state.lock().await;
            if !state.is_job(&plan.job_id) {
                return Ok(());
            }
            state.cursor = Cursor {
                primary_index: plan.targets.len(),
                secondary_index: 0,
            };
            state.checkpoint()
        };

        match checkpoint {
            Some(checkpoint) => self.save_checkpoint(&checkpoint).await,
            None => Ok(()),
        }
    }

    pub(crate) fn emit_part_flushed(&self, part: FlushedPart) {
        self.emit_event(Event::PartFlushed {
            slug: part.slug,
            part: part.part,
            rows: part.rows,
        });
    }
}

/// Flatten one item into a result row
fn build_row(
    details: ItemDetails,
    comments: Vec<String>,
    sub_target: &str,
    target: &str,
) -> ResultRow {
    let num_comments = comments.len() as u64;
    let comments = comments
        .into_iter()
        .filter(|body| !body.trim().is_empty())
        .collect();

    ResultRow {
        subreddit: if details.scope.is_empty() {
            sub_target.to_string()
        } else {
            details.scope
        },
        submission_id: details.id,
        title: details.title,
        submission_url: details.url,
        submission_text: details.text,
        score: details.score,
        upvote_ratio: details.upvote_ratio,
        num_comments,
        created_utc: details.created_utc,
        search_player: target.to_string(),
        comments,
    }
}
