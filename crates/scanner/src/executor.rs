//! Adapter from the engine bridge to the pipeline's executor capability.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use vigil_core::types::DbId;
use vigil_pipeline::{ExecutorError, ScanExecutor, ScanOutcome};

use crate::events::ScanEvent;
use crate::manager::ScanEngineManager;

/// Executes scans through the engine bridge: submit, then wait for this
/// job's terminal event on the broadcast channel.
pub struct EngineExecutor {
    manager: Arc<ScanEngineManager>,
}

impl EngineExecutor {
    pub fn new(manager: Arc<ScanEngineManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ScanExecutor for EngineExecutor {
    async fn execute(&self, job_id: DbId, image_ref: &str) -> Result<ScanOutcome, ExecutorError> {
        // Subscribe before submitting so a fast terminal event cannot slip
        // past between the HTTP response and the first recv.
        let mut events = self.manager.subscribe();

        self.manager
            .submit_scan(job_id, image_ref)
            .await
            .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;

        loop {
            match events.recv().await {
                Ok(ScanEvent::ScanCompleted {
                    job_id: id,
                    summary,
                }) if id == job_id => return Ok(ScanOutcome::Succeeded { summary }),
                Ok(ScanEvent::ScanFailed { job_id: id, error }) if id == job_id => {
                    return Ok(ScanOutcome::Failed { error })
                }
                Ok(ScanEvent::ScanCancelled { job_id: id }) if id == job_id => {
                    return Ok(ScanOutcome::Cancelled)
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(job_id, missed, "Event stream lagged while awaiting scan");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ExecutorError::StreamEnded(job_id))
                }
            }
        }
    }
}
