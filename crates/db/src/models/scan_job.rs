//! Scan job entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use vigil_core::scan_job::StatusId;
use vigil_core::types::{DbId, Timestamp};

/// A row from the `scan_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScanJob {
    pub id: DbId,
    pub batch_id: DbId,
    pub image_id: DbId,
    /// Canonical `name:tag` identity of the scanned image.
    pub image_ref: String,
    /// Human-readable display name, when one is configured.
    pub image_name: Option<String>,
    pub status_id: StatusId,
    pub progress_percent: i16,
    pub progress_step: Option<String>,
    pub error_message: Option<String>,
    /// 1-based position in the batch queue. Only meaningful while queued.
    pub queue_position: Option<i32>,
    pub estimated_wait_secs: Option<i32>,
    pub started_at: Option<Timestamp>,
    pub last_updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Query parameters for `GET /api/v1/scans`.
#[derive(Debug, Deserialize)]
pub struct ScanJobListQuery {
    /// Filter by status ID (e.g. 2 = running, 4 = failed).
    pub status_id: Option<StatusId>,
    /// Filter by owning batch.
    pub batch_id: Option<DbId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// A queued scan as exposed by the live snapshot surface.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueueEntry {
    pub job_id: DbId,
    pub batch_id: DbId,
    pub image_ref: String,
    pub queue_position: i32,
    pub estimated_wait_secs: i32,
}
