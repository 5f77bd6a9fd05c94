//! OpenAPI documentation and schema generation
//!
//! Defines the OpenAPI specification for the search-harvest REST API using
//! utoipa for compile-time spec generation.

use utoipa::OpenApi;

/// OpenAPI documentation for the search-harvest REST API
///
/// The spec can be accessed via:
/// - `/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "search-harvest REST API",
        version = "0.1.0",
        description = "REST API for running a resumable search-collection job and downloading its per-entity CSV artifacts",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    paths(
        // Job Control
        crate::api::routes::start_scrape,
        crate::api::routes::scrape_progress,
        crate::api::routes::pause_scrape,
        crate::api::routes::resume_scrape,
        crate::api::routes::cancel_scrape,
        crate::api::routes::resume_from_checkpoint,
        crate::api::routes::list_checkpoints,

        // Results
        crate::api::routes::list_results,
        crate::api::routes::get_result_file,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::JobStatus,
        crate::types::SearchParams,
        crate::types::Progress,
        crate::types::ResultsListing,
        crate::types::EntityResult,
        crate::types::Cursor,
        crate::types::SlugAssignment,
        crate::types::Checkpoint,
        crate::types::ResultRow,
        crate::types::Event,

        // API request/response types from routes
        crate::api::routes::OneOrMany,
        crate::api::routes::StartScrapeRequest,
        crate::api::routes::ResumeCheckpointRequest,
        crate::api::routes::ActionResponse,
        crate::api::routes::CheckpointList,
        crate::api::routes::SignedUrlResponse,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "scrape", description = "Job control - Start, pause, resume, cancel, and resume from checkpoints"),
        (name = "results", description = "Results - List per-entity outputs and download finalized CSV artifacts"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_lists_job_control_paths() {
        let spec = ApiDoc::openapi();

        for path in [
            "/scrape",
            "/scrape/progress",
            "/scrape/pause",
            "/scrape/resume-checkpoint",
            "/scrape/results/{file}",
            "/events",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing path {path}");
        }
    }

    #[test]
    fn test_openapi_spec_has_schemas() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components should be present");

        for schema in ["Progress", "ResultsListing", "ApiError", "StartScrapeRequest"] {
            assert!(
                components.schemas.contains_key(schema),
                "missing schema {schema}"
            );
        }
    }

    #[test]
    fn test_openapi_spec_serializes() {
        let json = serde_json::to_value(ApiDoc::openapi()).unwrap();
        assert_eq!(json["info"]["title"], "search-harvest REST API");
    }
}
