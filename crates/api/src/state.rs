use std::sync::Arc;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: vigil_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Observer feed connection manager.
    pub ws_manager: Arc<WsManager>,
    /// Scan engine bridge.
    pub engine: Arc<vigil_scanner::ScanEngineManager>,
    /// Batch execution pipeline.
    pub batch_runner: Arc<vigil_pipeline::BatchRunner>,
}
