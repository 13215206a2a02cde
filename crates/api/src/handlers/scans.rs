//! Handlers for the `/scans` resource.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use vigil_core::error::CoreError;
use vigil_core::scan_job::JobStatus;
use vigil_core::types::DbId;
use vigil_db::models::scan_job::ScanJobListQuery;
use vigil_db::repositories::ScanJobRepo;
use vigil_pipeline::{ProgressFeed, ProgressUpdate};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/scans
///
/// List scan jobs with optional `status_id`, `batch_id`, `limit`, and
/// `offset` query parameters.
pub async fn list_scans(
    State(state): State<AppState>,
    Query(params): Query<ScanJobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = ScanJobRepo::list(&state.pool, &params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/scans/{id}
///
/// Get a single scan job by ID.
pub async fn get_scan(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = ScanJobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Scan job",
            id: job_id,
        }))?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/scans/live
///
/// The full snapshot surface observers reconcile against: all running jobs
/// plus the queued set.
pub async fn live_snapshot(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let jobs = ScanJobRepo::list_running(&state.pool).await?;
    let queued = ScanJobRepo::list_queued_entries(&state.pool).await?;

    Ok(Json(serde_json::json!({
        "jobs": jobs,
        "queued_scans": queued,
    })))
}

/// POST /api/v1/scans/{id}/cancel
///
/// Cancel-by-id: asks the engine to stop in-flight work, then marks the
/// job cancelled unless it already reached a terminal state. Observers are
/// notified through the job's feed.
pub async fn cancel_scan(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = ScanJobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Scan job",
            id: job_id,
        }))?;

    // Queued jobs have nothing in flight on the engine; skip silently.
    if let Err(e) = state.engine.cancel_scan(job_id).await {
        tracing::debug!(job_id, error = %e, "No engine-side scan to cancel");
    }

    let cancelled = ScanJobRepo::cancel(&state.pool, job_id).await?;
    if cancelled {
        tracing::info!(job_id, "Scan cancelled");
        state
            .ws_manager
            .publish(ProgressUpdate::now(
                job_id,
                &job.image_ref,
                JobStatus::Cancelled,
                job.progress_percent,
            ))
            .await;
    }

    Ok(Json(DataResponse {
        data: serde_json::json!({ "cancelled": cancelled }),
    }))
}
