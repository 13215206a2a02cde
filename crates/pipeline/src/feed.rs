//! The progress-delivery capability exposed to observers.
//!
//! The pipeline publishes job status updates through this seam; the api
//! crate implements it over per-job WebSocket feeds.

use async_trait::async_trait;
use vigil_core::scan_job::JobStatus;
use vigil_core::types::{DbId, Timestamp};

/// One job status update destined for observers.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub job_id: DbId,
    /// Canonical `name:tag` identity of the scanned image.
    pub image_ref: String,
    pub status: JobStatus,
    pub progress: i16,
    pub step: Option<String>,
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

impl ProgressUpdate {
    /// Build an update stamped with the current time.
    pub fn now(job_id: DbId, image_ref: &str, status: JobStatus, progress: i16) -> Self {
        Self {
            job_id,
            image_ref: image_ref.to_string(),
            status,
            progress,
            step: None,
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Attach an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Pushes job updates to whoever is watching.
#[async_trait]
pub trait ProgressFeed: Send + Sync {
    async fn publish(&self, update: ProgressUpdate);
}

/// Feed that drops everything; for tests and headless runs.
pub struct NullProgressFeed;

#[async_trait]
impl ProgressFeed for NullProgressFeed {
    async fn publish(&self, _update: ProgressUpdate) {}
}
