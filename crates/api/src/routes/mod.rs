pub mod health;
pub mod scans;
pub mod schedules;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /schedules                      list
/// /schedules/{id}/execute         trigger a batch (POST, 202)
///
/// /scans                          list
/// /scans/live                     full snapshot (jobs + queued)
/// /scans/{id}                     get
/// /scans/{id}/cancel              cancel-by-id (POST)
/// /scans/{id}/feed                per-job push feed (WebSocket)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/schedules", schedules::router())
        .nest("/scans", scans::router())
}
