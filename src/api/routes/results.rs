//! Result handlers: listing and per-entity artifact downloads.

use super::SignedUrlResponse;
use crate::api::AppState;
use crate::error::ApiError;
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// GET /scrape/results - Per-entity outputs of the current job
#[utoipa::path(
    get,
    path = "/scrape/results",
    tag = "results",
    responses(
        (status = 200, description = "Result listing", body = crate::types::ResultsListing)
    )
)]
pub async fn list_results(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.list_results().await)
}

/// GET /scrape/results/:file - Finalized artifact (`{slug}.csv`) or its URL (`{slug}.url`)
///
/// Either form composes the artifact first if that has not happened yet.
#[utoipa::path(
    get,
    path = "/scrape/results/{file}",
    tag = "results",
    params(
        ("file" = String, Path, description = "`{slug}.csv` for the artifact, `{slug}.url` for a signed URL")
    ),
    responses(
        (status = 200, description = "CSV attachment or signed URL", body = SignedUrlResponse),
        (status = 404, description = "No such entity in the current job", body = ApiError),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
pub async fn get_result_file(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    if let Some(slug) = file.strip_suffix(".csv") {
        return match state.controller.finalize_and_fetch(slug).await {
            Ok(bytes) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}.csv\"", slug),
                    ),
                ],
                bytes,
            )
                .into_response(),
            Err(e) => {
                tracing::warn!(slug = %slug, error = %e, "Artifact download failed");
                e.into_response()
            }
        };
    }

    if let Some(slug) = file.strip_suffix(".url") {
        return match state.controller.finalize_and_signed_url(slug).await {
            Ok(url) => Json(SignedUrlResponse { url }).into_response(),
            Err(e) => {
                tracing::warn!(slug = %slug, error = %e, "Signed URL request failed");
                e.into_response()
            }
        };
    }

    (
        StatusCode::NOT_FOUND,
        Json(ApiError::not_found(format!("result file '{}'", file))),
    )
        .into_response()
}
