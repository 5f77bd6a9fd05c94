//! Checkpoint persistence: one JSON object per job under the checkpoint prefix.

use crate::error::{Error, Result, StorageError};
use crate::storage::JobLayout;
use crate::types::Checkpoint;

use super::JobController;

impl JobController {
    /// Persist `checkpoint` at `{checkpoint_prefix}/{job_id}.json`
    pub(crate) async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = JobLayout::checkpoint(&self.config.storage.checkpoint_prefix, &checkpoint.job_id);
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        self.store.put(&path, bytes).await?;

        tracing::debug!(
            job_id = %checkpoint.job_id,
            primary = checkpoint.cursor.primary_index,
            secondary = checkpoint.cursor.secondary_index,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Load the checkpoint of `job_id`
    ///
    /// Returns [`Error::NotFound`] when the job has no checkpoint.
    pub async fn load_checkpoint(&self, job_id: &str) -> Result<Checkpoint> {
        let path = JobLayout::checkpoint(&self.config.storage.checkpoint_prefix, job_id);
        let bytes = match self.store.get(&path).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => {
                return Err(Error::NotFound(format!("checkpoint for {}", job_id)));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Job ids that have a saved checkpoint, sorted
    pub async fn list_checkpoints(&self) -> Result<Vec<String>> {
        let prefix = format!(
            "{}/",
            self.config.storage.checkpoint_prefix.trim_end_matches('/')
        );
        let names = self.store.list_prefix(&prefix).await?;

        Ok(names
            .iter()
            .filter_map(|name| name.strip_prefix(&prefix)?.strip_suffix(".json"))
            .filter(|id| !id.contains('/'))
            .map(str::to_string)
            .collect())
    }
}
