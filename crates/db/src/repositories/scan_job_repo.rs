//! Repository for the `scan_jobs` table.
//!
//! Uses the `JobStatus` enum from `vigil_core` for all status transitions.
//! No magic numbers — every status literal is a named constant.

use sqlx::PgPool;
use vigil_core::batch::ImageTarget;
use vigil_core::scan_job::{JobStatus, StatusId};
use vigil_core::types::DbId;

use crate::models::scan_job::{QueueEntry, ScanJob, ScanJobListQuery};

/// Column list for `scan_jobs` queries.
const COLUMNS: &str = "\
    id, batch_id, image_id, image_ref, image_name, status_id, \
    progress_percent, progress_step, error_message, \
    queue_position, estimated_wait_secs, \
    started_at, last_updated_at, completed_at, created_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Terminal statuses: succeeded, failed, cancelled.
const TERMINAL_STATUSES: [StatusId; 3] = [
    JobStatus::Succeeded as StatusId,
    JobStatus::Failed as StatusId,
    JobStatus::Cancelled as StatusId,
];

/// Provides CRUD operations for scan jobs.
pub struct ScanJobRepo;

impl ScanJobRepo {
    /// Create a new queued job for one batch target.
    pub async fn create(
        pool: &PgPool,
        batch_id: DbId,
        target: &ImageTarget,
        queue_position: i32,
        estimated_wait_secs: i32,
    ) -> Result<ScanJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO scan_jobs \
                 (batch_id, image_id, image_ref, image_name, status_id, \
                  queue_position, estimated_wait_secs) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ScanJob>(&query)
            .bind(batch_id)
            .bind(target.id)
            .bind(target.canonical_ref())
            .bind(&target.name)
            .bind(JobStatus::Queued.id())
            .bind(queue_position)
            .bind(estimated_wait_secs)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ScanJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scan_jobs WHERE id = $1");
        sqlx::query_as::<_, ScanJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Mark a queued job as running and clear its queue metadata.
    ///
    /// Returns `false` when the job was not in `Queued` (already started,
    /// cancelled, or unknown), so callers can skip it without a second query.
    pub async fn mark_running(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scan_jobs \
             SET status_id = $2, started_at = NOW(), last_updated_at = NOW(), \
                 queue_position = NULL, estimated_wait_secs = NULL \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(job_id)
        .bind(JobStatus::Running.id())
        .bind(JobStatus::Queued.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update progress percentage and optional step for a running job.
    ///
    /// Progress never moves backwards: `GREATEST` keeps the stored value when
    /// a stale update arrives out of order.
    pub async fn update_progress(
        pool: &PgPool,
        job_id: DbId,
        percent: i16,
        step: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE scan_jobs \
             SET progress_percent = GREATEST(progress_percent, $2), \
                 progress_step = COALESCE($3, progress_step), \
                 last_updated_at = NOW() \
             WHERE id = $1 AND status_id = $4",
        )
        .bind(job_id)
        .bind(percent.clamp(0, 100))
        .bind(step)
        .bind(JobStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Cancel a job if it is not already in a terminal state.
    ///
    /// Returns `true` if the job was cancelled, `false` if it was already
    /// succeeded, failed, or cancelled.
    pub async fn cancel(pool: &PgPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scan_jobs \
             SET status_id = $2, completed_at = NOW(), last_updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($3, $4, $5)",
        )
        .bind(job_id)
        .bind(JobStatus::Cancelled.id())
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .bind(TERMINAL_STATUSES[2])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All currently running jobs, oldest start first.
    ///
    /// This is the `jobs` half of the live snapshot surface.
    pub async fn list_running(pool: &PgPool) -> Result<Vec<ScanJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM scan_jobs \
             WHERE status_id = $1 \
             ORDER BY started_at ASC NULLS LAST"
        );
        sqlx::query_as::<_, ScanJob>(&query)
            .bind(JobStatus::Running.id())
            .fetch_all(pool)
            .await
    }

    /// All queued jobs as snapshot queue entries, by queue position.
    pub async fn list_queued_entries(pool: &PgPool) -> Result<Vec<QueueEntry>, sqlx::Error> {
        sqlx::query_as::<_, QueueEntry>(
            "SELECT id AS job_id, batch_id, image_ref, \
                    COALESCE(queue_position, 0) AS queue_position, \
                    COALESCE(estimated_wait_secs, 0) AS estimated_wait_secs \
             FROM scan_jobs \
             WHERE status_id = $1 \
             ORDER BY batch_id, queue_position",
        )
        .bind(JobStatus::Queued.id())
        .fetch_all(pool)
        .await
    }

    /// List jobs with optional status/batch filters and pagination.
    pub async fn list(
        pool: &PgPool,
        params: &ScanJobListQuery,
    ) -> Result<Vec<ScanJob>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if params.status_id.is_some() {
            conditions.push(format!("status_id = ${bind_idx}"));
            bind_idx += 1;
        }

        if params.batch_id.is_some() {
            conditions.push(format!("batch_id = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM scan_jobs \
             {where_clause} \
             ORDER BY created_at DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, ScanJob>(&query);

        if let Some(sid) = params.status_id {
            q = q.bind(sid);
        }
        if let Some(bid) = params.batch_id {
            q = q.bind(bid);
        }

        q = q.bind(limit).bind(offset);

        q.fetch_all(pool).await
    }
}
