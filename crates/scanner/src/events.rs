//! Platform events emitted by the scan engine bridge.
//!
//! These events represent high-level state changes the rest of the platform
//! cares about, produced by [`crate::manager`] after correlating raw engine
//! messages back to scan jobs.

use serde::Serialize;
use vigil_core::types::DbId;

/// A platform-level event originating from the scan engine.
#[derive(Debug, Clone, Serialize)]
pub enum ScanEvent {
    /// The WebSocket connection to the engine was established.
    EngineConnected,

    /// The WebSocket connection to the engine was lost.
    EngineDisconnected,

    /// The engine accepted a scan job and began working on it.
    ScanStarted { job_id: DbId },

    /// A scan job made progress.
    ScanProgress {
        job_id: DbId,
        /// Completion percentage (0-100).
        percent: i16,
        /// The analysis phase currently running, if reported.
        step: Option<String>,
    },

    /// A scan job completed successfully.
    ScanCompleted {
        job_id: DbId,
        /// Findings digest from the engine.
        summary: serde_json::Value,
    },

    /// A scan job failed with an error.
    ScanFailed { job_id: DbId, error: String },

    /// A scan job was cancelled.
    ScanCancelled { job_id: DbId },
}
