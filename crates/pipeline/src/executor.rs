//! The scan execution capability consumed by the pipeline.
//!
//! The actual image-inspection machinery (registry access, scanner
//! invocation) lives behind this seam; the pipeline only cares about the
//! terminal outcome of one target's scan.

use async_trait::async_trait;
use vigil_core::types::DbId;

/// Terminal outcome of one target's scan.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// The scan finished; `summary` carries the engine's findings digest.
    Succeeded { summary: serde_json::Value },
    /// The scan failed with a human-readable error.
    Failed { error: String },
    /// The scan was cancelled through the cancel-by-id capability.
    Cancelled,
}

/// Errors from the executor itself, as opposed to a failed scan.
///
/// The pipeline counts these as per-target failures; they never abort the
/// batch.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The engine could not be reached or refused the submission.
    #[error("Scan engine unavailable: {0}")]
    Unavailable(String),

    /// The engine stopped reporting before a terminal outcome arrived.
    #[error("Scan engine stream ended before job {0} finished")]
    StreamEnded(DbId),
}

/// Executes one scan job to completion.
#[async_trait]
pub trait ScanExecutor: Send + Sync {
    /// Run the scan for `job_id` against `image_ref` and wait for its
    /// terminal outcome.
    async fn execute(&self, job_id: DbId, image_ref: &str) -> Result<ScanOutcome, ExecutorError>;
}
