//! Route definitions for the `/scans` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::scans;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/scans`.
///
/// ```text
/// GET    /                -> list_scans
/// GET    /live            -> live_snapshot
/// GET    /{id}            -> get_scan
/// POST   /{id}/cancel     -> cancel_scan
/// GET    /{id}/feed       -> per-job push feed (WebSocket upgrade)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(scans::list_scans))
        .route("/live", get(scans::live_snapshot))
        .route("/{id}", get(scans::get_scan))
        .route("/{id}/cancel", post(scans::cancel_scan))
        .route("/{id}/feed", get(ws::handler::feed_handler))
}
