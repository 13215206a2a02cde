//! The record-keeping capability consumed by the pipeline.
//!
//! [`Persistence`] is an explicit seam over the `vigil-db` repositories so
//! the runner can be driven against in-memory fakes in tests. The
//! production implementation is [`PgPersistence`].

use async_trait::async_trait;
use vigil_core::batch::{BatchStatus, ImageTarget};
use vigil_core::types::DbId;
use vigil_db::models::schedule::ScanSchedule;
use vigil_db::repositories::{BatchRepo, ImageRepo, ScanJobRepo, ScheduleRepo};
use vigil_db::DbPool;

/// A schedule as the pipeline needs it, decoupled from the database row.
#[derive(Debug, Clone)]
pub struct ScheduleSpec {
    pub id: DbId,
    pub name: String,
    pub selection_mode: String,
    pub target_ids: Vec<DbId>,
    pub pattern: Option<String>,
    pub enabled: bool,
}

impl From<ScanSchedule> for ScheduleSpec {
    fn from(row: ScanSchedule) -> Self {
        let target_ids = row.configured_target_ids();
        Self {
            id: row.id,
            name: row.name,
            selection_mode: row.selection_mode,
            target_ids,
            pattern: row.pattern,
            enabled: row.enabled,
        }
    }
}

/// Errors from the persistence capability.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// A database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A non-database persistence failure (fakes, invariants).
    #[error("{0}")]
    Other(String),
}

/// Owns job, batch, and schedule records for the pipeline.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn load_schedule(&self, id: DbId) -> Result<Option<ScheduleSpec>, PersistenceError>;

    async fn list_inventory(&self) -> Result<Vec<ImageTarget>, PersistenceError>;

    async fn create_batch(
        &self,
        schedule_id: Option<DbId>,
        total_targets: i32,
    ) -> Result<DbId, PersistenceError>;

    async fn create_job(
        &self,
        batch_id: DbId,
        target: &ImageTarget,
        queue_position: i32,
        estimated_wait_secs: i32,
    ) -> Result<DbId, PersistenceError>;

    async fn mark_batch_running(&self, batch_id: DbId) -> Result<(), PersistenceError>;

    /// Returns `false` when the job is no longer queued (e.g. cancelled),
    /// in which case the pipeline skips it.
    async fn mark_job_running(&self, job_id: DbId) -> Result<bool, PersistenceError>;

    /// Persist one target's terminal outcome: job terminal state plus the
    /// matching batch counter, atomically. Returns the updated
    /// `(completed_count, failed_count)`.
    async fn record_target_outcome(
        &self,
        batch_id: DbId,
        job_id: DbId,
        succeeded: bool,
        error: Option<&str>,
    ) -> Result<(i32, i32), PersistenceError>;

    async fn cancel_job(&self, job_id: DbId) -> Result<bool, PersistenceError>;

    async fn cancel_remaining_jobs(&self, batch_id: DbId) -> Result<u64, PersistenceError>;

    async fn finalize_batch(
        &self,
        batch_id: DbId,
        status: BatchStatus,
    ) -> Result<(), PersistenceError>;

    async fn force_fail_batch(&self, batch_id: DbId, error: &str)
        -> Result<(), PersistenceError>;
}

/// Production persistence over the Postgres repositories.
pub struct PgPersistence {
    pool: DbPool,
}

impl PgPersistence {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Persistence for PgPersistence {
    async fn load_schedule(&self, id: DbId) -> Result<Option<ScheduleSpec>, PersistenceError> {
        Ok(ScheduleRepo::find_by_id(&self.pool, id)
            .await?
            .map(ScheduleSpec::from))
    }

    async fn list_inventory(&self) -> Result<Vec<ImageTarget>, PersistenceError> {
        Ok(ImageRepo::list_all(&self.pool)
            .await?
            .into_iter()
            .map(ImageTarget::from)
            .collect())
    }

    async fn create_batch(
        &self,
        schedule_id: Option<DbId>,
        total_targets: i32,
    ) -> Result<DbId, PersistenceError> {
        Ok(BatchRepo::create(&self.pool, schedule_id, total_targets)
            .await?
            .id)
    }

    async fn create_job(
        &self,
        batch_id: DbId,
        target: &ImageTarget,
        queue_position: i32,
        estimated_wait_secs: i32,
    ) -> Result<DbId, PersistenceError> {
        Ok(
            ScanJobRepo::create(&self.pool, batch_id, target, queue_position, estimated_wait_secs)
                .await?
                .id,
        )
    }

    async fn mark_batch_running(&self, batch_id: DbId) -> Result<(), PersistenceError> {
        Ok(BatchRepo::mark_running(&self.pool, batch_id).await?)
    }

    async fn mark_job_running(&self, job_id: DbId) -> Result<bool, PersistenceError> {
        Ok(ScanJobRepo::mark_running(&self.pool, job_id).await?)
    }

    async fn record_target_outcome(
        &self,
        batch_id: DbId,
        job_id: DbId,
        succeeded: bool,
        error: Option<&str>,
    ) -> Result<(i32, i32), PersistenceError> {
        Ok(BatchRepo::record_target_outcome(&self.pool, batch_id, job_id, succeeded, error).await?)
    }

    async fn cancel_job(&self, job_id: DbId) -> Result<bool, PersistenceError> {
        Ok(ScanJobRepo::cancel(&self.pool, job_id).await?)
    }

    async fn cancel_remaining_jobs(&self, batch_id: DbId) -> Result<u64, PersistenceError> {
        Ok(BatchRepo::cancel_remaining_jobs(&self.pool, batch_id).await?)
    }

    async fn finalize_batch(
        &self,
        batch_id: DbId,
        status: BatchStatus,
    ) -> Result<(), PersistenceError> {
        Ok(BatchRepo::finalize(&self.pool, batch_id, status).await?)
    }

    async fn force_fail_batch(
        &self,
        batch_id: DbId,
        error: &str,
    ) -> Result<(), PersistenceError> {
        Ok(BatchRepo::force_fail(&self.pool, batch_id, error).await?)
    }
}
