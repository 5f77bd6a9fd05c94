//! REST API server module
//!
//! A thin axum layer over [`JobController`]: start and steer the single
//! collection job, watch its progress, and download the per-entity artifacts.

use crate::{Config, JobController, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Job Control
/// - `POST /scrape` - Start a job
/// - `GET /scrape/progress` - Progress snapshot
/// - `POST /scrape/pause` - Pause the running job
/// - `POST /scrape/resume` - Resume the paused job
/// - `POST /scrape/cancel` - Cancel the job
/// - `POST /scrape/resume-checkpoint` - Continue a job from its checkpoint
/// - `GET /scrape/checkpoints` - Job ids with a saved checkpoint
///
/// ## Results
/// - `GET /scrape/results` - Per-entity outputs of the current job
/// - `GET /scrape/results/:slug.csv` - Finalized artifact as a CSV attachment
/// - `GET /scrape/results/:slug.url` - Time-limited download URL
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(controller: Arc<JobController>, config: Arc<Config>) -> Router {
    let state = AppState::new(controller, config.clone());

    let router = Router::new()
        // Job Control
        .route("/scrape", post(routes::start_scrape))
        .route("/scrape/progress", get(routes::scrape_progress))
        .route("/scrape/pause", post(routes::pause_scrape))
        .route("/scrape/resume", post(routes::resume_scrape))
        .route("/scrape/cancel", post(routes::cancel_scrape))
        .route(
            "/scrape/resume-checkpoint",
            post(routes::resume_from_checkpoint),
        )
        .route("/scrape/checkpoints", get(routes::list_checkpoints))
        // Results
        .route("/scrape/results", get(routes::list_results))
        .route("/scrape/results/:file", get(routes::get_result_file))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // SwaggerUi serves its own copy of the spec next to /openapi.json
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state);

    if config.api.cors_enabled {
        let cors = build_cors_layer(&config.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` (or an empty list) allows any origin; otherwise only the listed
/// origins are allowed. All methods and headers are permitted.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address
///
/// Runs until the server stops. See [`start_api_server_with_shutdown`] for a
/// server that stops on a signal.
///
/// # Example
///
/// ```no_run
/// use search_harvest::{Config, JobController, MemoryStore, StaticProvider};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let controller = Arc::new(JobController::new(
///     (*config).clone(),
///     Arc::new(MemoryStore::new()),
///     Arc::new(StaticProvider::new()),
/// )?);
///
/// // Blocks until the server stops
/// search_harvest::api::start_api_server(controller, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(controller: Arc<JobController>, config: Arc<Config>) -> Result<()> {
    start_api_server_with_shutdown(controller, config, std::future::pending()).await
}

/// Start the API server and stop accepting connections once `shutdown` resolves
///
/// In-flight requests are allowed to complete. The controller is not shut
/// down here; call [`JobController::graceful_shutdown`] afterwards.
pub async fn start_api_server_with_shutdown(
    controller: Arc<JobController>,
    config: Arc<Config>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(controller, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
