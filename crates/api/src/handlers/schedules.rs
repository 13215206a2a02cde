//! Handlers for the `/schedules` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use vigil_core::types::DbId;
use vigil_db::repositories::ScheduleRepo;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/schedules
///
/// List all scan schedules.
pub async fn list_schedules(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let schedules = ScheduleRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: schedules }))
}

/// POST /api/v1/schedules/{id}/execute
///
/// Trigger a batch for a schedule. Returns `202 Accepted` with
/// `{execution_id, total_targets, status}` once targets are resolved and
/// the batch record exists; per-target work continues in the background.
/// Configuration errors (disabled schedule, empty target set, invalid
/// pattern, unsupported mode) come back as 4xx and create nothing.
pub async fn execute_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let started = state.batch_runner.execute_schedule(schedule_id).await?;

    tracing::info!(
        schedule_id,
        batch_id = started.batch_id,
        total_targets = started.total_targets,
        "Batch execution triggered",
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "execution_id": started.batch_id,
            "total_targets": started.total_targets,
            "status": started.status,
        })),
    ))
}
