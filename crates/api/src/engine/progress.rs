//! Scan event handler for live job progress.
//!
//! Translates non-terminal [`ScanEvent`] variants into job database updates
//! and observer feed messages. Terminal outcomes are not handled here: they
//! flow back through the executor into the pipeline, which persists them
//! together with the batch counters and publishes the final feed message.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use vigil_core::scan_job::JobStatus;
use vigil_db::repositories::ScanJobRepo;
use vigil_pipeline::{ProgressFeed, ProgressUpdate};
use vigil_scanner::ScanEvent;

use crate::ws::WsManager;

/// Consume scan events until the channel closes or shutdown is requested.
pub async fn run_progress_pump(
    pool: PgPool,
    ws_manager: Arc<WsManager>,
    mut events: broadcast::Receiver<ScanEvent>,
    cancel: CancellationToken,
) {
    tracing::info!("Scan progress pump started");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Scan progress pump shutting down");
                return;
            }
            event = events.recv() => match event {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Scan progress pump lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Scan event channel closed");
                    return;
                }
            }
        };
        handle_scan_event(&pool, &ws_manager, &event).await;
    }
}

/// Handle one scan event: update the job record and notify observers.
async fn handle_scan_event(pool: &PgPool, ws_manager: &WsManager, event: &ScanEvent) {
    match event {
        ScanEvent::ScanProgress {
            job_id,
            percent,
            step,
        } => {
            if let Err(e) =
                ScanJobRepo::update_progress(pool, *job_id, *percent, step.as_deref()).await
            {
                tracing::error!(job_id, error = %e, "Failed to update job progress");
            }

            let image_ref = match ScanJobRepo::find_by_id(pool, *job_id).await {
                Ok(Some(job)) => job.image_ref,
                Ok(None) => {
                    tracing::warn!(job_id, "Progress for unknown job");
                    return;
                }
                Err(e) => {
                    tracing::error!(job_id, error = %e, "Failed to load job for progress push");
                    return;
                }
            };

            let mut update =
                ProgressUpdate::now(*job_id, &image_ref, JobStatus::Running, *percent);
            update.step = step.clone();
            ws_manager.publish(update).await;
        }

        ScanEvent::ScanStarted { job_id } => {
            // The pipeline already marked the job running; this is purely a
            // liveness breadcrumb.
            tracing::debug!(job_id, "Engine confirmed scan start");
        }

        ScanEvent::EngineConnected => {
            tracing::info!("Scan engine connected");
        }

        ScanEvent::EngineDisconnected => {
            tracing::warn!("Scan engine disconnected");
        }

        // Terminal outcomes are persisted (with batch counters) and
        // published by the pipeline.
        ScanEvent::ScanCompleted { .. }
        | ScanEvent::ScanFailed { .. }
        | ScanEvent::ScanCancelled { .. } => {}
    }
}
