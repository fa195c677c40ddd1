//! Generation request and status polling handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use reelgen_models::{GenerateRequest, GenerationJob, JobId, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Body of the 202 returned by `POST /api/videos/generate`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Job snapshot returned to pollers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
}

impl From<GenerationJob> for JobStatusResponse {
    fn from(job: GenerationJob) -> Self {
        Self {
            id: job.id.to_string(),
            status: job.status,
            progress: job.progress,
            error: job.error,
            output_url: job.output_url,
        }
    }
}

/// Accept a generation request and start it in the background.
///
/// The request is validated before an executor slot is reserved, and the
/// slot is reserved before the job record exists, so a rejected request
/// leaves nothing behind.
pub async fn generate_video(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let new_job = request.into_new_job(state.worker.hook_duration)?;

    let admission = state.executor.try_admit().map_err(|e| {
        metrics::record_job_rejected();
        ApiError::from(e)
    })?;

    let job = state.store.create(new_job).await?;
    info!(
        job_id = %job.id,
        categories = ?job.categories,
        use_hook = job.use_hook,
        total_length = job.total_length,
        "Accepted generation request"
    );
    metrics::record_job_accepted();

    state.executor.spawn(admission, job.id.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            job_id: job.id.to_string(),
            status: job.status,
        }),
    ))
}

/// Current status of a job.
pub async fn get_video_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let uuid = Uuid::parse_str(&id)
        .map_err(|_| ApiError::bad_request(format!("Invalid job id: {id}")))?;
    let job_id = JobId::from_string(uuid.to_string());

    let job = state
        .store
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job not found: {id}")))?;

    Ok(Json(job.into()))
}
