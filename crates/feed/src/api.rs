//! HTTP snapshot client for the vigil API.
//!
//! Fetches the live snapshot (`GET /api/v1/scans/live`) using [`reqwest`]
//! and converts the wire rows into store views. This is the pull half of
//! the delivery layer; the push half lives in [`crate::client`].

use async_trait::async_trait;
use serde::Deserialize;
use vigil_core::scan_job::{JobStatus, StatusId};
use vigil_core::types::{DbId, Timestamp};

use crate::store::{JobView, QueueEntryView};
use crate::sync::{Snapshot, SnapshotError, SnapshotSource};

/// HTTP client for the snapshot surface of one vigil server.
pub struct SnapshotClient {
    client: reqwest::Client,
    base_url: String,
}

/// Wire shape of `GET /api/v1/scans/live`.
#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    jobs: Vec<SnapshotJob>,
    queued_scans: Vec<QueueEntryView>,
}

/// One job row as serialized by the server.
#[derive(Debug, Deserialize)]
struct SnapshotJob {
    id: DbId,
    image_ref: String,
    image_name: Option<String>,
    status_id: StatusId,
    progress_percent: i16,
    progress_step: Option<String>,
    error_message: Option<String>,
    queue_position: Option<i32>,
    estimated_wait_secs: Option<i32>,
    started_at: Option<Timestamp>,
    last_updated_at: Timestamp,
}

impl SnapshotJob {
    /// Convert a wire row into a store view.
    ///
    /// Returns `None` for rows with a status id this client does not know;
    /// callers log and skip those rather than failing the whole snapshot.
    fn into_view(self) -> Option<JobView> {
        let status = JobStatus::from_id(self.status_id)?;
        Some(JobView {
            job_id: self.id,
            image_ref: self.image_ref,
            image_name: self.image_name,
            status,
            progress: self.progress_percent.clamp(0, 100),
            step: self.progress_step,
            error: self.error_message,
            started_at: self.started_at,
            last_updated_at: self.last_updated_at,
            queue_position: self.queue_position,
            estimated_wait_secs: self.estimated_wait_secs,
        })
    }
}

impl SnapshotClient {
    /// Create a client targeting a server's HTTP base URL.
    ///
    /// * `base_url` - e.g. `http://host:3000`, no trailing slash.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, SnapshotError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(SnapshotError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl SnapshotSource for SnapshotClient {
    async fn fetch(&self) -> Result<Snapshot, SnapshotError> {
        let response = self
            .client
            .get(format!("{}/api/v1/scans/live", self.base_url))
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let body: SnapshotResponse = response.json().await?;

        let jobs = body
            .jobs
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                let status_id = row.status_id;
                match row.into_view() {
                    Some(view) => Some(view),
                    None => {
                        tracing::warn!(job_id = id, status_id, "Skipping snapshot row with unknown status");
                        None
                    }
                }
            })
            .collect();

        Ok(Snapshot {
            jobs,
            queued: body.queued_scans,
        })
    }
}
