//! REST API server example
//!
//! Runs a job controller against the Reddit search API, writing CSV parts to a
//! local directory, with the REST API enabled.
//!
//! Credentials come from `REDDIT_CLIENT_ID` / `REDDIT_CLIENT_SECRET`; the port
//! from `PORT` (default 8080). `HARVEST_DATA_DIR` overrides the output
//! directory and `HARVEST_TARGETS_FILE` names a CSV with a `player` column.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:8080/swagger-ui
//! - Start a job via POST http://localhost:8080/scrape
//! - Monitor progress via GET http://localhost:8080/scrape/progress
//! - Stream events via GET http://localhost:8080/events

use search_harvest::api::start_api_server_with_shutdown;
use search_harvest::{Config, JobController, LocalStore, RedditProvider, shutdown_signal};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let mut config = Config::from_env()?;
    config.api.targets_file = std::env::var_os("HARVEST_TARGETS_FILE").map(PathBuf::from);

    let data_dir =
        std::env::var_os("HARVEST_DATA_DIR").map_or_else(|| PathBuf::from("harvest-data"), PathBuf::from);
    let signing_secret =
        std::env::var("HARVEST_SIGNING_SECRET").unwrap_or_else(|_| "change-me".to_string());
    let store = LocalStore::new(&data_dir, signing_secret);

    let controller = Arc::new(JobController::new(
        config.clone(),
        Arc::new(store),
        Arc::new(RedditProvider::new(config.reddit.clone())),
    )?);

    println!("Writing results under {}", data_dir.display());
    println!("Starting API server on http://{}", config.api.bind_address);
    println!("Swagger UI: http://{}/swagger-ui", config.api.bind_address);
    println!("Press Ctrl+C to stop");

    start_api_server_with_shutdown(controller.clone(), Arc::new(config), shutdown_signal()).await?;

    // Flush buffered rows and persist a checkpoint before exiting
    controller.graceful_shutdown().await?;
    println!("Stopped; resume later with POST /scrape/resume-checkpoint");

    Ok(())
}
