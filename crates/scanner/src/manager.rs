//! Scan engine connection manager.
//!
//! [`ScanEngineManager`] owns the persistent WebSocket connection to the
//! scan engine (connect -> process -> reconnect loop), correlates engine
//! scan ids back to platform job ids, and exposes scan submission and
//! cancellation APIs.
//!
//! Platform-level events are broadcast via a [`tokio::sync::broadcast`]
//! channel. Call [`ScanEngineManager::subscribe`] to receive them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use vigil_core::types::DbId;

use crate::api::ScanEngineApi;
use crate::client::ScanEngineClient;
use crate::events::ScanEvent;
use crate::messages::{parse_message, EngineMessage};
use crate::reconnect::{reconnect_loop, ReconnectConfig};

/// Broadcast channel capacity for platform events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection settings for the scan engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// WebSocket base URL, e.g. `ws://engine:8080`.
    pub ws_url: String,
    /// HTTP base URL, e.g. `http://engine:8080`.
    pub api_url: String,
}

/// Manages the persistent connection to the scan engine.
///
/// Created once at application startup via [`ScanEngineManager::start`].
/// The returned `Arc` can be cheaply cloned into request handlers.
pub struct ScanEngineManager {
    api: ScanEngineApi,
    event_tx: broadcast::Sender<ScanEvent>,
    /// Engine scan id -> platform job id for in-flight scans.
    executions: Mutex<HashMap<String, DbId>>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
    task_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ScanEngineManager {
    /// Connect to the engine and keep the connection alive.
    ///
    /// Returns a shared handle that is safe to clone into Axum state.
    pub fn start(config: EngineConfig) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let manager = Arc::new(Self {
            api: ScanEngineApi::new(config.api_url),
            event_tx,
            executions: Mutex::new(HashMap::new()),
            cancel: cancel.clone(),
            task_handle: Mutex::new(None),
        });

        let client = ScanEngineClient::new(config.ws_url);
        let task_manager = Arc::clone(&manager);
        let handle = tokio::spawn(async move {
            tracing::info!("Starting scan engine connection task");
            run_connection_loop(&client, &task_manager, &cancel).await;
            tracing::info!("Scan engine connection task exited");
        });
        *manager
            .task_handle
            .lock()
            .expect("task handle lock poisoned") = Some(handle);

        manager
    }

    /// Subscribe to platform-level scan events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.event_tx.subscribe()
    }

    /// Submit one image scan to the engine.
    ///
    /// Records the scan-id mapping so incoming WebSocket messages can be
    /// correlated back to the platform job.
    pub async fn submit_scan(
        &self,
        job_id: DbId,
        image_ref: &str,
    ) -> Result<String, ScanEngineError> {
        let client_id = uuid::Uuid::new_v4().to_string();

        let response = self
            .api
            .submit_scan(image_ref, job_id, &client_id)
            .await
            .map_err(|e| ScanEngineError::SubmitFailed(e.to_string()))?;

        self.executions
            .lock()
            .expect("executions lock poisoned")
            .insert(response.scan_id.clone(), job_id);

        tracing::info!(
            job_id,
            scan_id = %response.scan_id,
            queue_position = response.queue_position,
            "Scan submitted to engine",
        );

        Ok(response.scan_id)
    }

    /// Cancel a queued or running scan by its platform job ID.
    ///
    /// This is the external cancel-by-id capability; tearing down an
    /// observer's feed never reaches here.
    pub async fn cancel_scan(&self, job_id: DbId) -> Result<(), ScanEngineError> {
        let scan_id = self
            .executions
            .lock()
            .expect("executions lock poisoned")
            .iter()
            .find(|(_, mapped)| **mapped == job_id)
            .map(|(scan_id, _)| scan_id.clone())
            .ok_or(ScanEngineError::ScanNotFound(job_id))?;

        self.api
            .cancel_scan(&scan_id)
            .await
            .map_err(|e| ScanEngineError::CancelFailed(e.to_string()))?;

        self.executions
            .lock()
            .expect("executions lock poisoned")
            .remove(&scan_id);

        let _ = self.event_tx.send(ScanEvent::ScanCancelled { job_id });
        Ok(())
    }

    /// Gracefully shut down the connection task.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down scan engine manager");
        self.cancel.cancel();
        let handle = self
            .task_handle
            .lock()
            .expect("task handle lock poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
        }
    }

    // ---- message correlation ----

    fn job_for_scan(&self, scan_id: &str) -> Option<DbId> {
        self.executions
            .lock()
            .expect("executions lock poisoned")
            .get(scan_id)
            .copied()
    }

    fn finish_scan(&self, scan_id: &str) -> Option<DbId> {
        self.executions
            .lock()
            .expect("executions lock poisoned")
            .remove(scan_id)
    }
}

/// Core connection loop: connect -> process messages -> reconnect.
///
/// Runs until the cancellation token is triggered.
async fn run_connection_loop(
    client: &ScanEngineClient,
    manager: &Arc<ScanEngineManager>,
    cancel: &CancellationToken,
) {
    let reconnect_config = ReconnectConfig::default();

    loop {
        let conn = match client.connect().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Engine connection failed, entering reconnect loop");
                match reconnect_loop(client, &reconnect_config, cancel).await {
                    Some(conn) => conn,
                    None => return, // cancelled
                }
            }
        };

        let _ = manager.event_tx.send(ScanEvent::EngineConnected);

        let mut ws_stream = conn.ws_stream;
        process_messages(&mut ws_stream, manager, cancel).await;

        let _ = manager.event_tx.send(ScanEvent::EngineDisconnected);

        if cancel.is_cancelled() {
            return;
        }

        tracing::info!("Engine connection lost, entering reconnect loop");
        match reconnect_loop(client, &reconnect_config, cancel).await {
            Some(_) => continue,
            None => return, // cancelled
        }
    }
}

/// Process WebSocket messages until the connection drops or is cancelled.
async fn process_messages(
    ws_stream: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    manager: &Arc<ScanEngineManager>,
    cancel: &CancellationToken,
) {
    loop {
        let msg_result = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = ws_stream.next() => match frame {
                Some(result) => result,
                None => return,
            }
        };

        match msg_result {
            Ok(Message::Text(text)) => handle_text_message(&text, manager),
            Ok(Message::Binary(_)) => {
                tracing::trace!("Ignoring binary engine message");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Handled automatically by tungstenite.
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "Engine WebSocket closed");
                return;
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => {
                tracing::error!(error = %e, "Engine WebSocket receive error");
                return;
            }
        }
    }
}

/// Dispatch a single parsed text frame to the matching event.
fn handle_text_message(text: &str, manager: &Arc<ScanEngineManager>) {
    let msg = match parse_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(error = %e, raw_message = %text, "Failed to parse engine message");
            return;
        }
    };

    match msg {
        EngineMessage::ScanStarted(data) => {
            let Some(job_id) = manager.job_for_scan(&data.scan_id) else {
                tracing::warn!(scan_id = %data.scan_id, "Started event for unknown scan");
                return;
            };
            tracing::info!(job_id, scan_id = %data.scan_id, "Engine started scan");
            let _ = manager.event_tx.send(ScanEvent::ScanStarted { job_id });
        }
        EngineMessage::ScanProgress(data) => {
            let Some(job_id) = manager.job_for_scan(&data.scan_id) else {
                tracing::debug!(scan_id = %data.scan_id, "Progress for unknown scan");
                return;
            };
            let _ = manager.event_tx.send(ScanEvent::ScanProgress {
                job_id,
                percent: data.percent.clamp(0, 100),
                step: data.step,
            });
        }
        EngineMessage::ScanCompleted(data) => {
            let Some(job_id) = manager.finish_scan(&data.scan_id) else {
                tracing::warn!(scan_id = %data.scan_id, "Completion for unknown scan");
                return;
            };
            tracing::info!(job_id, scan_id = %data.scan_id, "Engine completed scan");
            let _ = manager.event_tx.send(ScanEvent::ScanCompleted {
                job_id,
                summary: data.summary,
            });
        }
        EngineMessage::ScanFailed(data) => {
            let Some(job_id) = manager.finish_scan(&data.scan_id) else {
                tracing::warn!(scan_id = %data.scan_id, "Failure for unknown scan");
                return;
            };
            tracing::error!(job_id, scan_id = %data.scan_id, error = %data.error, "Engine scan failed");
            let _ = manager.event_tx.send(ScanEvent::ScanFailed {
                job_id,
                error: data.error,
            });
        }
        EngineMessage::ScanCancelled(data) => {
            let Some(job_id) = manager.finish_scan(&data.scan_id) else {
                return;
            };
            let _ = manager.event_tx.send(ScanEvent::ScanCancelled { job_id });
        }
        EngineMessage::QueueStatus(data) => {
            tracing::debug!(queue_remaining = data.queue_remaining, "Engine queue status");
        }
    }
}

/// Errors that can occur when interacting with the manager.
#[derive(Debug, thiserror::Error)]
pub enum ScanEngineError {
    /// No in-flight scan exists for the given platform job.
    #[error("Scan for job {0} not found")]
    ScanNotFound(DbId),

    /// The scan submission HTTP call failed.
    #[error("Failed to submit scan: {0}")]
    SubmitFailed(String),

    /// The cancellation HTTP call failed.
    #[error("Failed to cancel scan: {0}")]
    CancelFailed(String),
}
