//! Result listing and on-demand finalization.

use crate::error::{Error, Result};
use crate::types::{EntityResult, ResultsListing};

use super::JobController;

impl JobController {
    /// Per-entity outputs of the current job
    ///
    /// Entities are listed in target order. `part_count` reflects parts
    /// flushed so far; buffered rows are not counted.
    pub async fn list_results(&self) -> ResultsListing {
        let (job_id, prefix, status, message, slugs, layout) = {
            let state = self.state.lock().await;
            (
                state.job_id.clone(),
                state.layout.as_ref().map(|l| l.job_prefix()),
                state.status,
                state.message.clone(),
                state.slugs.clone(),
                state.layout.clone(),
            )
        };

        let files = match (&job_id, layout) {
            (Some(job_id), Some(layout)) => {
                let writer = self.writer.lock().await;
                let writer = writer
                    .as_ref()
                    .filter(|w| w.layout().job_id() == job_id.as_str());
                slugs
                    .into_iter()
                    .map(|assignment| EntityResult {
                        part_count: writer.map_or(0, |w| w.part_count(&assignment.slug)),
                        final_artifact_path: layout.final_artifact(&assignment.slug),
                        target: assignment.target,
                        slug: assignment.slug,
                    })
                    .collect()
            }
            _ => Vec::new(),
        };

        ResultsListing {
            job_id,
            prefix,
            status,
            message,
            chunk_rows: self.config.storage.chunk_rows,
            files,
        }
    }

    /// Finalize the entity's artifact and return its contents
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if `slug` is not part of the current job.
    pub async fn finalize_and_fetch(&self, slug: &str) -> Result<Vec<u8>> {
        let path = self.finalize(slug).await?;
        Ok(self.store.get(&path).await?)
    }

    /// Finalize the entity's artifact and return a time-limited download URL
    ///
    /// The URL lifetime is [`JobConfig::signed_url_ttl`](crate::config::JobConfig::signed_url_ttl).
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if `slug` is not part of the current job.
    pub async fn finalize_and_signed_url(&self, slug: &str) -> Result<String> {
        let path = self.finalize(slug).await?;
        Ok(self
            .store
            .signed_url(&path, self.config.job.signed_url_ttl)
            .await?)
    }

    /// Compose the artifact of `slug` (idempotent) and return its path
    async fn finalize(&self, slug: &str) -> Result<String> {
        let job_id = {
            let state = self.state.lock().await;
            if !state.slugs.iter().any(|s| s.slug == slug) {
                return Err(Error::NotFound(format!("results for {}", slug)));
            }
            state.job_id.clone().unwrap_or_default()
        };

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .filter(|w| w.layout().job_id() == job_id)
            .ok_or_else(|| Error::NotFound(format!("results for {}", slug)))?;

        writer.finalize(slug).await
    }
}
