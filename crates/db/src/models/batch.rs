//! Scan batch entity model.

use serde::Serialize;
use sqlx::FromRow;
use vigil_core::scan_job::StatusId;
use vigil_core::types::{DbId, Timestamp};

/// A row from the `scan_batches` table.
///
/// Counters are only ever mutated together with the matching job's terminal
/// update, inside one transaction (see `BatchRepo::record_target_outcome`).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScanBatch {
    pub id: DbId,
    /// Parent schedule; NULL for ad-hoc batches.
    pub schedule_id: Option<DbId>,
    pub status_id: StatusId,
    pub total_targets: i32,
    pub completed_count: i32,
    pub failed_count: i32,
    pub error_message: Option<String>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}
