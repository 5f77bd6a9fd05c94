//! Job controller split into focused submodules.
//!
//! The `JobController` struct and its methods are organized by concern:
//! - [`state`] - Locked job state and progress snapshots
//! - [`lifecycle`] - Start, resume-from-checkpoint, finish and graceful shutdown
//! - [`control`] - Pause, resume, cancel and progress reads
//! - [`execution`] - The unit-by-unit execution loop
//! - [`checkpoint`] - Checkpoint persistence
//! - [`results`] - Result listing and finalization

mod checkpoint;
mod control;
mod execution;
mod lifecycle;
mod results;
mod state;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::Result;
use crate::search::SearchProvider;
use crate::storage::ObjectStore;
use crate::types::Event;
use crate::writer::ChunkedWriter;
use state::JobState;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Runs one search-collection job at a time (cloneable - all fields are Arc-wrapped)
///
/// Construct one per process (or per test) and share clones with the request
/// layer. All job state lives behind a single lock that is never held across
/// upstream or storage I/O.
#[derive(Clone)]
pub struct JobController {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Object store receiving headers, parts, artifacts and checkpoints
    pub(crate) store: Arc<dyn ObjectStore>,
    /// Search API session factory
    pub(crate) provider: Arc<dyn SearchProvider>,
    /// Job state shared by the request layer and the execution loop
    pub(crate) state: Arc<Mutex<JobState>>,
    /// Chunked writer of the current job (None before the first start)
    pub(crate) writer: Arc<Mutex<Option<ChunkedWriter>>>,
    /// Handle of the running execution loop, awaited on shutdown
    pub(crate) task: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Flag cleared during shutdown so new jobs are refused
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl JobController {
    /// Create a controller over the given store and search provider
    ///
    /// Fails if the configuration does not validate.
    pub fn new(
        config: Config,
        store: Arc<dyn ObjectStore>,
        provider: Arc<dyn SearchProvider>,
    ) -> Result<Self> {
        config.validate()?;

        // Buffer of 1000 events per subscriber before Lagged
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        tracing::info!(
            store = store.name(),
            provider = provider.name(),
            chunk_rows = config.storage.chunk_rows,
            "Job controller initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            provider,
            state: Arc::new(Mutex::new(JobState::default())),
            writer: Arc::new(Mutex::new(None)),
            task: Arc::new(Mutex::new(None)),
            accepting_new: Arc::new(AtomicBool::new(true)),
            event_tx,
        })
    }

    /// Subscribe to job events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls behind by more than 1000 events receives
    /// `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use search_harvest::{Config, JobController, MemoryStore, StaticProvider};
    /// use std::sync::Arc;
    ///
    /// # fn example() -> search_harvest::Result<()> {
    /// let controller = JobController::new(
    ///     Config::default(),
    ///     Arc::new(MemoryStore::new()),
    ///     Arc::new(StaticProvider::new()),
    /// )?;
    ///
    /// let mut events = controller.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         println!("{:?}", event);
    ///     }
    /// });
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration this controller was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Object store this controller writes to
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // No receivers is fine
        self.event_tx.send(event).ok();
    }
}
