//! Object naming for a job's output.
//!
//! ```text
//! {prefix}/{job_id}/{slug}/header.csv
//! {prefix}/{job_id}/{slug}/part-00001.csv
//! {prefix}/{job_id}/{slug}/_compose_tmp/compose-s0-0.csv
//! {prefix}/{job_id}/{slug}.csv
//! {checkpoint_prefix}/{job_id}.json
//! ```

/// Path scheme for one job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobLayout {
    results_prefix: String,
    job_id: String,
}

impl JobLayout {
    /// Layout for `job_id` under `results_prefix`
    pub fn new(results_prefix: impl Into<String>, job_id: impl Into<String>) -> Self {
        let results_prefix: String = results_prefix.into();
        Self {
            results_prefix: results_prefix.trim_end_matches('/').to_string(),
            job_id: job_id.into(),
        }
    }

    /// Job identifier
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Directory holding every object of the job
    pub fn job_prefix(&self) -> String {
        if self.results_prefix.is_empty() {
            self.job_id.clone()
        } else {
            format!("{}/{}", self.results_prefix, self.job_id)
        }
    }

    /// Header object of an entity
    pub fn header(&self, slug: &str) -> String {
        format!("{}/{}/header.csv", self.job_prefix(), slug)
    }

    /// Numbered part object of an entity (1-based)
    pub fn part(&self, slug: &str, number: usize) -> String {
        format!("{}/{}/part-{:05}.csv", self.job_prefix(), slug, number)
    }

    /// Prefix shared by every part object of an entity
    pub fn parts_prefix(&self, slug: &str) -> String {
        format!("{}/{}/part-", self.job_prefix(), slug)
    }

    /// Composed artifact of an entity
    pub fn final_artifact(&self, slug: &str) -> String {
        format!("{}/{}.csv", self.job_prefix(), slug)
    }

    /// Prefix for intermediate compose objects of an entity
    pub fn compose_tmp_prefix(&self, slug: &str) -> String {
        format!("{}/{}/_compose_tmp", self.job_prefix(), slug)
    }

    /// Checkpoint object of a job
    pub fn checkpoint(checkpoint_prefix: &str, job_id: &str) -> String {
        format!("{}/{}.json", checkpoint_prefix.trim_end_matches('/'), job_id)
    }
}
