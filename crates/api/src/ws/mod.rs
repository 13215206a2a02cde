//! Observer-facing WebSocket infrastructure: per-job push feeds.

pub mod handler;
pub mod heartbeat;
pub mod manager;

pub use heartbeat::start_heartbeat;
pub use manager::WsManager;

use vigil_pipeline::ProgressUpdate;

/// Wire payload for a `progress` feed message.
///
/// The shape is the contract with observer clients; `vigil-feed` pins it
/// from the consuming side.
pub fn progress_payload(update: &ProgressUpdate) -> serde_json::Value {
    serde_json::json!({
        "type": "progress",
        "request_id": update.job_id,
        "scan_id": update.image_ref,
        "status": update.status.as_str(),
        "progress": update.progress,
        "step": update.step,
        "error": update.error,
        "timestamp": update.timestamp,
    })
}

/// Wire payload for the post-upgrade handshake acknowledgement.
pub fn connected_payload() -> serde_json::Value {
    serde_json::json!({ "type": "connected" })
}

/// Wire payload for a liveness heartbeat.
pub fn heartbeat_payload() -> serde_json::Value {
    serde_json::json!({ "type": "heartbeat" })
}
