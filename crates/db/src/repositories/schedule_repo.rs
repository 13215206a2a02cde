//! Repository for the `scan_schedules` table.

use sqlx::PgPool;
use vigil_core::types::DbId;

use crate::models::schedule::ScanSchedule;

/// Column list for `scan_schedules` queries.
const COLUMNS: &str = "\
    id, name, selection_mode, target_ids, pattern, enabled, \
    created_at, updated_at";

/// Provides read operations for scan schedules.
pub struct ScheduleRepo;

impl ScheduleRepo {
    /// Find a schedule by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ScanSchedule>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scan_schedules WHERE id = $1");
        sqlx::query_as::<_, ScanSchedule>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all schedules, newest first.
    pub async fn list(pool: &PgPool) -> Result<Vec<ScanSchedule>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scan_schedules ORDER BY created_at DESC");
        sqlx::query_as::<_, ScanSchedule>(&query)
            .fetch_all(pool)
            .await
    }
}
