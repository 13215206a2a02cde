//! The batch runner: validate, resolve, fan out, account.
//!
//! A trigger call validates the schedule and resolves its target set
//! synchronously (configuration errors never create a batch), then hands
//! the per-target work to a supervised background task. The caller gets
//! `{batch_id, total_targets, STARTED}` back immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use vigil_core::batch::{check_counters, finalize_status, resolve_targets, ImageTarget, SelectionMode};
use vigil_core::error::CoreError;
use vigil_core::estimation::{estimate_wait_secs, DEFAULT_AVG_SCAN_SECS};
use vigil_core::scan_job::JobStatus;
use vigil_core::types::DbId;

use crate::executor::{ScanExecutor, ScanOutcome};
use crate::feed::{ProgressFeed, ProgressUpdate};
use crate::persistence::{Persistence, PersistenceError};

/// Immediate response to a batch trigger.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchStarted {
    pub batch_id: DbId,
    pub total_targets: i32,
    pub status: &'static str,
}

/// A fault that escaped per-target handling; forces the batch to Failed.
#[derive(Debug, thiserror::Error)]
enum PipelineError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Counter invariant violated: {0}")]
    CounterDrift(String),
}

/// Bookkeeping for one in-flight batch task.
struct RunningBatch {
    cancel: CancellationToken,
    supervisor: tokio::task::JoinHandle<()>,
}

/// Executes batches against injected capabilities.
///
/// One instance per process; cheap to clone via `Arc` into request
/// handlers.
pub struct BatchRunner {
    persistence: Arc<dyn Persistence>,
    executor: Arc<dyn ScanExecutor>,
    feed: Arc<dyn ProgressFeed>,
    running: Arc<RwLock<HashMap<DbId, RunningBatch>>>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        executor: Arc<dyn ScanExecutor>,
        feed: Arc<dyn ProgressFeed>,
    ) -> Arc<Self> {
        Arc::new(Self {
            persistence,
            executor,
            feed,
            running: Arc::new(RwLock::new(HashMap::new())),
            cancel: CancellationToken::new(),
        })
    }

    /// Trigger a schedule's batch.
    ///
    /// Synchronous phase: load + validate the schedule, resolve targets,
    /// create the batch and its queued jobs. Configuration errors (disabled
    /// schedule, zero targets, invalid pattern, unimplemented mode) are
    /// returned here and never create a batch. The per-target work then
    /// runs in a supervised background task.
    pub async fn execute_schedule(
        self: &Arc<Self>,
        schedule_id: DbId,
    ) -> Result<BatchStarted, CoreError> {
        let schedule = self
            .persistence
            .load_schedule(schedule_id)
            .await
            .map_err(internal)?
            .ok_or(CoreError::NotFound {
                entity: "Schedule",
                id: schedule_id,
            })?;

        if !schedule.enabled {
            return Err(CoreError::Validation(format!(
                "Schedule '{}' is disabled",
                schedule.name
            )));
        }

        let mode = SelectionMode::parse(&schedule.selection_mode)?;
        let inventory = self.persistence.list_inventory().await.map_err(internal)?;
        let targets = resolve_targets(
            mode,
            &schedule.target_ids,
            schedule.pattern.as_deref(),
            &inventory,
        )?;

        if targets.is_empty() {
            return Err(CoreError::Validation(format!(
                "Schedule '{}' resolved zero scan targets",
                schedule.name
            )));
        }

        let total_targets = targets.len() as i32;
        let batch_id = self
            .persistence
            .create_batch(Some(schedule.id), total_targets)
            .await
            .map_err(internal)?;

        let mut jobs: Vec<(DbId, ImageTarget)> = Vec::with_capacity(targets.len());
        for (index, target) in targets.into_iter().enumerate() {
            let queue_position = index as i32 + 1;
            let estimated_wait = estimate_wait_secs(queue_position, DEFAULT_AVG_SCAN_SECS);
            match self
                .persistence
                .create_job(batch_id, &target, queue_position, estimated_wait)
                .await
            {
                Ok(job_id) => jobs.push((job_id, target)),
                Err(e) => {
                    // The batch exists but cannot be populated; fail it
                    // rather than leaving a half-created Pending batch.
                    let _ = self
                        .persistence
                        .force_fail_batch(batch_id, &format!("Job creation failed: {e}"))
                        .await;
                    return Err(internal(e));
                }
            }
        }

        tracing::info!(
            batch_id,
            schedule_id,
            total_targets,
            "Batch created, starting background execution",
        );

        self.spawn_batch(batch_id, jobs).await;

        Ok(BatchStarted {
            batch_id,
            total_targets,
            status: "STARTED",
        })
    }

    /// Request cancellation of a running batch.
    ///
    /// The pipeline honours it at the next safe point between target units.
    /// Returns `false` for unknown or already-finished batches.
    pub async fn cancel(&self, batch_id: DbId) -> bool {
        let running = self.running.read().await;
        match running.get(&batch_id) {
            Some(batch) => {
                batch.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Batches currently executing.
    pub async fn running_batches(&self) -> Vec<DbId> {
        self.running.read().await.keys().copied().collect()
    }

    /// Cancel everything and wait briefly for supervisors to finish.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down batch runner");
        self.cancel.cancel();

        let batches: Vec<(DbId, RunningBatch)> = {
            let mut running = self.running.write().await;
            running.drain().collect()
        };
        for (batch_id, batch) in batches {
            batch.cancel.cancel();
            if tokio::time::timeout(Duration::from_secs(5), batch.supervisor)
                .await
                .is_err()
            {
                tracing::warn!(batch_id, "Batch supervisor did not stop in time");
            }
        }
    }

    /// Spawn the per-batch work task plus a supervisor that observes it.
    ///
    /// The supervisor guarantees the batch record never stays `Running`: a
    /// pipeline-level fault or a panic both force it to `Failed` with the
    /// captured message.
    async fn spawn_batch(self: &Arc<Self>, batch_id: DbId, jobs: Vec<(DbId, ImageTarget)>) {
        let cancel = self.cancel.child_token();
        let work = tokio::spawn(run_batch(
            Arc::clone(&self.persistence),
            Arc::clone(&self.executor),
            Arc::clone(&self.feed),
            batch_id,
            jobs,
            cancel.clone(),
        ));

        let persistence = Arc::clone(&self.persistence);
        let running = Arc::clone(&self.running);
        let supervisor = tokio::spawn(async move {
            match work.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(batch_id, error = %e, "Batch pipeline fault");
                    if let Err(persist_err) = persistence
                        .force_fail_batch(batch_id, &e.to_string())
                        .await
                    {
                        tracing::error!(
                            batch_id,
                            error = %persist_err,
                            "Failed to force-fail faulted batch",
                        );
                    }
                }
                Err(join_err) => {
                    let message = if join_err.is_panic() {
                        format!("Batch task panicked: {join_err}")
                    } else {
                        "Batch task aborted".to_string()
                    };
                    tracing::error!(batch_id, error = %message, "Batch task died");
                    if let Err(persist_err) =
                        persistence.force_fail_batch(batch_id, &message).await
                    {
                        tracing::error!(
                            batch_id,
                            error = %persist_err,
                            "Failed to force-fail dead batch",
                        );
                    }
                }
            }
            running.write().await.remove(&batch_id);
        });

        self.running
            .write()
            .await
            .insert(batch_id, RunningBatch { cancel, supervisor });
    }
}

fn internal(e: PersistenceError) -> CoreError {
    CoreError::Internal(e.to_string())
}

/// Sequential per-target execution with transactional accounting.
///
/// A single target's failure is counted and never aborts the batch; the
/// cancellation token is honoured between target units.
async fn run_batch(
    persistence: Arc<dyn Persistence>,
    executor: Arc<dyn ScanExecutor>,
    feed: Arc<dyn ProgressFeed>,
    batch_id: DbId,
    jobs: Vec<(DbId, ImageTarget)>,
    cancel: CancellationToken,
) -> Result<(), PipelineError> {
    let total_targets = jobs.len() as i32;
    let mut completed = 0i32;
    let mut failed = 0i32;

    for (job_id, target) in jobs {
        if cancel.is_cancelled() {
            let cancelled = persistence.cancel_remaining_jobs(batch_id).await?;
            tracing::info!(batch_id, cancelled, "Batch cancelled between targets");
            break;
        }

        let image_ref = target.canonical_ref();

        if !persistence.mark_job_running(job_id).await? {
            // Cancelled (or otherwise moved on) while queued; skip it.
            tracing::info!(job_id, batch_id, "Skipping job no longer queued");
            continue;
        }
        persistence.mark_batch_running(batch_id).await?;
        feed.publish(ProgressUpdate::now(job_id, &image_ref, JobStatus::Running, 0))
            .await;

        match executor.execute(job_id, &image_ref).await {
            Ok(ScanOutcome::Succeeded { .. }) => {
                let (c, f) = persistence
                    .record_target_outcome(batch_id, job_id, true, None)
                    .await?;
                completed = c;
                failed = f;
                feed.publish(ProgressUpdate::now(
                    job_id,
                    &image_ref,
                    JobStatus::Succeeded,
                    100,
                ))
                .await;
            }
            Ok(ScanOutcome::Failed { error }) => {
                tracing::warn!(job_id, batch_id, error = %error, "Scan target failed");
                let (c, f) = persistence
                    .record_target_outcome(batch_id, job_id, false, Some(&error))
                    .await?;
                completed = c;
                failed = f;
                feed.publish(
                    ProgressUpdate::now(job_id, &image_ref, JobStatus::Failed, 0)
                        .with_error(error),
                )
                .await;
            }
            Ok(ScanOutcome::Cancelled) => {
                persistence.cancel_job(job_id).await?;
                feed.publish(ProgressUpdate::now(
                    job_id,
                    &image_ref,
                    JobStatus::Cancelled,
                    0,
                ))
                .await;
            }
            Err(e) => {
                // Executor trouble counts against this target only.
                tracing::error!(job_id, batch_id, error = %e, "Executor error");
                let message = e.to_string();
                let (c, f) = persistence
                    .record_target_outcome(batch_id, job_id, false, Some(&message))
                    .await?;
                completed = c;
                failed = f;
                feed.publish(
                    ProgressUpdate::now(job_id, &image_ref, JobStatus::Failed, 0)
                        .with_error(message),
                )
                .await;
            }
        }
    }

    check_counters(total_targets, completed, failed)
        .map_err(|e| PipelineError::CounterDrift(e.to_string()))?;

    let status = finalize_status(total_targets, failed);
    persistence.finalize_batch(batch_id, status).await?;
    tracing::info!(
        batch_id,
        completed,
        failed,
        status = status.as_str(),
        "Batch finalized",
    );
    Ok(())
}
