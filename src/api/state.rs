//! Application state for the API server

use crate::{Config, JobController};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The job controller every handler delegates to
    pub controller: Arc<JobController>,

    /// Configuration (request defaults, targets file)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(controller: Arc<JobController>, config: Arc<Config>) -> Self {
        Self { controller, config }
    }
}
