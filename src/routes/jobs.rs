use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::app_state::AppState;
use crate::models::api::{JobListResponse, JobQuery, JobView, SubmitJobResponse};
use crate::models::job::{DayRange, SubmitJobRequest};
use crate::routes::error::ApiError;
use crate::services::identity::Caller;
use crate::services::{gateway, query};

/// POST /job — submit a job for asynchronous processing.
pub async fn submit_job(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    let response = gateway::submit_job(&state, &caller, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /job?job_id=ID — status of one job, with a signed artifact link when complete.
pub async fn get_job(
    State(state): State<AppState>,
    Query(params): Query<JobQuery>,
) -> Result<Json<JobView>, ApiError> {
    let job_id = params
        .job_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("job_id parameter is required".to_string()))?;

    Ok(Json(query::get_job(&state, &job_id).await?))
}

/// GET /jobs — the caller's jobs created today (UTC).
pub async fn list_jobs(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<JobListResponse>, ApiError> {
    let today = DayRange::containing(state.clock.now());
    query::list_jobs(&state, &caller.user_id, today)
        .await
        .map(Json)
        .map_err(|e| match ApiError::from(e) {
            ApiError::Internal(_) => ApiError::Internal("Failed to retrieve jobs"),
            other => other,
        })
}
