//! Job control handlers: start, progress, pause/resume/cancel, checkpoints.

use super::{
    ActionResponse, CheckpointList, OneOrMany, ResumeCheckpointRequest, StartScrapeRequest,
};
use crate::api::AppState;
use crate::error::{ApiError, Error};
use crate::types::JobRequest;
use crate::utils::targets_from_csv;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /scrape - Start a job
#[utoipa::path(
    post,
    path = "/scrape",
    tag = "scrape",
    request_body = StartScrapeRequest,
    responses(
        (status = 202, description = "Job started", body = ActionResponse),
        (status = 400, description = "Invalid parameters or no players", body = ApiError),
        (status = 409, description = "A job is already active", body = ActionResponse),
        (status = 503, description = "Shutting down", body = ApiError)
    )
)]
pub async fn start_scrape(
    State(state): State<AppState>,
    body: Option<Json<StartScrapeRequest>>,
) -> Response {
    let body = body.map(|Json(body)| body).unwrap_or_default();

    let targets = match body.players.filter(|p| !p.is_empty()) {
        Some(players) => players,
        None => match load_targets_file(&state).await {
            Ok(players) => players,
            Err(e) => return e.into_response(),
        },
    };

    let sub_targets = match body
        .subreddits
        .map(OneOrMany::into_vec)
        .filter(|subs| !subs.is_empty())
    {
        Some(subs) => subs,
        None => body.subreddit.into_iter().collect(),
    };

    let request = JobRequest {
        targets,
        sub_targets,
        limit: body.search_limit,
        time_filter: body.time_filter,
        sort: body.sort,
    };

    match state.controller.start(request).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(ActionResponse::new("accepted", "Job started").with_job_id(job_id)),
        )
            .into_response(),
        Err(Error::Busy) => (
            StatusCode::CONFLICT,
            Json(ActionResponse::new("busy", Error::Busy.to_string())),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Rejected start request");
            e.into_response()
        }
    }
}

/// Players from the configured targets file, or none when it is unset
async fn load_targets_file(state: &AppState) -> crate::Result<Vec<String>> {
    let Some(path) = state.config.api.targets_file.clone() else {
        return Ok(Vec::new());
    };

    tokio::task::spawn_blocking(move || targets_from_csv(&path))
        .await
        .map_err(|e| Error::Other(format!("targets file reader failed: {}", e)))?
}

/// GET /scrape/progress - Progress snapshot
#[utoipa::path(
    get,
    path = "/scrape/progress",
    tag = "scrape",
    responses(
        (status = 200, description = "Current job progress", body = crate::types::Progress)
    )
)]
pub async fn scrape_progress(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.progress().await)
}

/// POST /scrape/pause - Pause the running job
#[utoipa::path(
    post,
    path = "/scrape/pause",
    tag = "scrape",
    responses(
        (status = 200, description = "Job paused", body = ActionResponse),
        (status = 400, description = "No running job", body = ApiError)
    )
)]
pub async fn pause_scrape(State(state): State<AppState>) -> Response {
    control_response(
        state.controller.pause().await,
        ActionResponse::new("paused", "Job paused"),
    )
}

/// POST /scrape/resume - Resume the paused job
#[utoipa::path(
    post,
    path = "/scrape/resume",
    tag = "scrape",
    responses(
        (status = 200, description = "Job resumed", body = ActionResponse),
        (status = 400, description = "No paused job", body = ApiError)
    )
)]
pub async fn resume_scrape(State(state): State<AppState>) -> Response {
    control_response(
        state.controller.resume().await,
        ActionResponse::new("running", "Job resumed"),
    )
}

/// POST /scrape/cancel - Cancel the running or paused job
#[utoipa::path(
    post,
    path = "/scrape/cancel",
    tag = "scrape",
    responses(
        (status = 200, description = "Cancellation requested", body = ActionResponse),
        (status = 400, description = "No active job", body = ApiError)
    )
)]
pub async fn cancel_scrape(State(state): State<AppState>) -> Response {
    control_response(
        state.controller.cancel().await,
        ActionResponse::new("cancelling", "Cancellation requested"),
    )
}

/// Lifecycle controls answer 400 on any refusal
fn control_response(result: crate::Result<()>, ok: ActionResponse) -> Response {
    match result {
        Ok(()) => (StatusCode::OK, Json(ok)).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ApiError::from(e))).into_response(),
    }
}

/// POST /scrape/resume-checkpoint - Continue a job from its checkpoint
#[utoipa::path(
    post,
    path = "/scrape/resume-checkpoint",
    tag = "scrape",
    request_body = ResumeCheckpointRequest,
    responses(
        (status = 202, description = "Job resumed from checkpoint", body = ActionResponse),
        (status = 400, description = "Missing job id, unknown checkpoint, or busy", body = ApiError)
    )
)]
pub async fn resume_from_checkpoint(
    State(state): State<AppState>,
    body: Option<Json<ResumeCheckpointRequest>>,
) -> Response {
    let job_id = body
        .and_then(|Json(body)| body.job_id)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());
    let Some(job_id) = job_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::validation("job_id is required")),
        )
            .into_response();
    };

    match state.controller.resume_from_checkpoint(&job_id).await {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(
                ActionResponse::new("accepted", format!("Resuming {}", job_id))
                    .with_job_id(job_id),
            ),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "Resume from checkpoint refused");
            (StatusCode::BAD_REQUEST, Json(ApiError::from(e))).into_response()
        }
    }
}

/// GET /scrape/checkpoints - Job ids with a saved checkpoint
#[utoipa::path(
    get,
    path = "/scrape/checkpoints",
    tag = "scrape",
    responses(
        (status = 200, description = "Checkpointed job ids", body = CheckpointList),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
pub async fn list_checkpoints(State(state): State<AppState>) -> Response {
    match state.controller.list_checkpoints().await {
        Ok(checkpoints) => Json(CheckpointList { checkpoints }).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to list checkpoints");
            e.into_response()
        }
    }
}
