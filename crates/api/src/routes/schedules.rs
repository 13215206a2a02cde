//! Route definitions for the `/schedules` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::schedules;
use crate::state::AppState;

/// Routes mounted at `/schedules`.
///
/// ```text
/// GET    /                  -> list_schedules
/// POST   /{id}/execute      -> execute_schedule (202 Accepted)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(schedules::list_schedules))
        .route("/{id}/execute", post(schedules::execute_schedule))
}
