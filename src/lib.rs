//! # search-harvest
//!
//! Resumable, rate-limited search collection jobs that stream chunked CSV
//! artifacts into object storage.
//!
//! A [`JobController`] runs one job at a time: every primary entity (a search
//! query) is searched within every secondary entity (a search scope), each hit
//! is flattened into a CSV row, and rows are written per entity as small
//! immutable part objects. On demand the parts are composed into one artifact
//! per entity, which can be fetched directly or through a time-limited URL.
//!
//! ## Design Philosophy
//!
//! - **Resumable** - A checkpoint is persisted before every unit of work
//! - **Polite** - Every upstream call runs under a classified backoff policy
//! - **Storage-agnostic** - Anything implementing [`ObjectStore`] works
//! - **Event-driven** - Consumers subscribe to events instead of polling
//!
//! ## Quick Start
//!
//! ```no_run
//! use search_harvest::{Config, JobController, JobRequest, MemoryStore, RedditProvider};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let controller = JobController::new(
//!         config.clone(),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(RedditProvider::new(config.reddit.clone())),
//!     )?;
//!
//!     // Subscribe to events
//!     let mut events = controller.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     controller
//!         .start(JobRequest::new(["LeBron James"], ["nba"]))
//!         .await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Job controller and execution loop (decomposed into focused submodules)
pub mod controller;
/// Error types
pub mod error;
/// Backoff policy for upstream calls
pub mod retry;
/// Search provider seam and implementations
pub mod search;
/// Object storage seam, path layout and compose engine
pub mod storage;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Chunked CSV writer
pub mod writer;

// Re-export commonly used types
pub use config::{ApiConfig, Config, JobConfig, RedditConfig, RetryConfig, StorageConfig};
pub use controller::JobController;
pub use error::{
    ApiError, Error, ErrorDetail, Result, StorageError, ToHttpStatus, UpstreamError,
};
pub use search::{
    ItemDetails, ItemRef, RedditProvider, SearchProvider, SearchQuery, SearchSession,
    StaticItem, StaticProvider,
};
pub use storage::{JobLayout, LocalStore, MemoryStore, ObjectStore};
pub use types::{
    Checkpoint, Cursor, EntityResult, Event, JobRequest, JobStatus, Progress, ResultRow,
    ResultsListing, SearchParams, SlugAssignment,
};
pub use writer::ChunkedWriter;

/// Run the controller until a termination signal arrives, then shut it down gracefully.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use search_harvest::{Config, JobController, MemoryStore, StaticProvider, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let controller = JobController::new(
///         Config::default(),
///         Arc::new(MemoryStore::new()),
///         Arc::new(StaticProvider::new()),
///     )?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(controller).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(controller: JobController) -> Result<()> {
    shutdown_signal().await;
    controller.graceful_shutdown().await
}

/// Resolve once SIGTERM or SIGINT (Ctrl+C elsewhere) is received
///
/// Suitable as the shutdown future of
/// [`start_api_server_with_shutdown`](api::start_api_server_with_shutdown).
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "Shutdown signal received"),
                _ = sigint.recv() => tracing::info!(signal = "SIGINT", "Shutdown signal received"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "Could not register both signal handlers, waiting on the other");
            only.recv().await;
            tracing::info!("Shutdown signal received");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

/// Resolve once Ctrl+C is received
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl_c", "Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
