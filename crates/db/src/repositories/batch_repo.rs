//! Repository for the `scan_batches` table.
//!
//! The counter columns are only ever touched together with the matching
//! job's terminal update, inside one transaction, so the invariant
//! `completed_count + failed_count <= total_targets` cannot drift even when
//! the process dies mid-batch.

use sqlx::PgPool;
use vigil_core::batch::BatchStatus;
use vigil_core::scan_job::JobStatus;
use vigil_core::types::DbId;

use crate::models::batch::ScanBatch;

/// Column list for `scan_batches` queries.
const COLUMNS: &str = "\
    id, schedule_id, status_id, total_targets, completed_count, failed_count, \
    error_message, started_at, completed_at, created_at";

/// Provides CRUD operations for scan batches.
pub struct BatchRepo;

impl BatchRepo {
    /// Create a new pending batch with a fixed target count.
    pub async fn create(
        pool: &PgPool,
        schedule_id: Option<DbId>,
        total_targets: i32,
    ) -> Result<ScanBatch, sqlx::Error> {
        let query = format!(
            "INSERT INTO scan_batches (schedule_id, status_id, total_targets) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ScanBatch>(&query)
            .bind(schedule_id)
            .bind(BatchStatus::Pending.id())
            .bind(total_targets)
            .fetch_one(pool)
            .await
    }

    /// Find a batch by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ScanBatch>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scan_batches WHERE id = $1");
        sqlx::query_as::<_, ScanBatch>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Transition a pending batch to running and stamp `started_at`.
    ///
    /// Idempotent: a batch already past `Pending` is left untouched, so the
    /// pipeline can call this on every first job start without a pre-read.
    pub async fn mark_running(pool: &PgPool, batch_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE scan_batches \
             SET status_id = $2, started_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(batch_id)
        .bind(BatchStatus::Running.id())
        .bind(BatchStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Persist one target's terminal outcome: the job's terminal status and
    /// the matching batch counter, in a single transaction.
    ///
    /// Returns the updated `(completed_count, failed_count)` pair.
    pub async fn record_target_outcome(
        pool: &PgPool,
        batch_id: DbId,
        job_id: DbId,
        succeeded: bool,
        error: Option<&str>,
    ) -> Result<(i32, i32), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let job_status = if succeeded {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };

        sqlx::query(
            "UPDATE scan_jobs \
             SET status_id = $2, error_message = $3, completed_at = NOW(), \
                 last_updated_at = NOW(), \
                 progress_percent = CASE WHEN $4 THEN 100 ELSE progress_percent END \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(job_status.id())
        .bind(error)
        .bind(succeeded)
        .execute(&mut *tx)
        .await?;

        let counter_column = if succeeded {
            "completed_count"
        } else {
            "failed_count"
        };
        let query = format!(
            "UPDATE scan_batches \
             SET {counter_column} = {counter_column} + 1 \
             WHERE id = $1 \
             RETURNING completed_count, failed_count"
        );
        let (completed, failed): (i32, i32) = sqlx::query_as(&query)
            .bind(batch_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((completed, failed))
    }

    /// Finalize a batch with its terminal status and completion timestamp.
    ///
    /// A batch that is already terminal is left untouched.
    pub async fn finalize(
        pool: &PgPool,
        batch_id: DbId,
        status: BatchStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE scan_batches \
             SET status_id = $2, completed_at = NOW() \
             WHERE id = $1 AND status_id IN ($3, $4)",
        )
        .bind(batch_id)
        .bind(status.id())
        .bind(BatchStatus::Pending.id())
        .bind(BatchStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Force a non-terminal batch to `Failed` with a captured error message.
    ///
    /// Used when the pipeline task itself faults; a batch must never be left
    /// running indefinitely.
    pub async fn force_fail(
        pool: &PgPool,
        batch_id: DbId,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE scan_batches \
             SET status_id = $2, error_message = $3, completed_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $5)",
        )
        .bind(batch_id)
        .bind(BatchStatus::Failed.id())
        .bind(error)
        .bind(BatchStatus::Pending.id())
        .bind(BatchStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Cancel every still-queued job of a batch.
    ///
    /// Used when batch cancellation is observed between target units.
    /// Returns the number of jobs cancelled.
    pub async fn cancel_remaining_jobs(
        pool: &PgPool,
        batch_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE scan_jobs \
             SET status_id = $2, completed_at = NOW(), last_updated_at = NOW() \
             WHERE batch_id = $1 AND status_id = $3",
        )
        .bind(batch_id)
        .bind(JobStatus::Cancelled.id())
        .bind(JobStatus::Queued.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
