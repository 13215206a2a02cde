//! WebSocket transport for per-job push feeds.
//!
//! [`FeedClient`] dials the server's per-job feed endpoint over WebSocket.
//! The [`FeedDialer`] trait is the seam the connection manager works
//! against, so tests can substitute scripted transports.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use vigil_core::types::DbId;

/// A stream of inbound text frames from one job's push feed.
///
/// The stream ends when the server closes the channel; transport errors are
/// surfaced as `Err` items.
pub type FeedStream = Pin<Box<dyn Stream<Item = Result<String, FeedClientError>> + Send>>;

/// Errors that can occur when working with the push-feed transport.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A transport-level error on an already-established connection.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Opens a push-feed stream for one job.
#[async_trait]
pub trait FeedDialer: Send + Sync + 'static {
    /// Dial the per-job feed endpoint, returning the inbound frame stream.
    async fn dial(&self, job_id: DbId) -> Result<FeedStream, FeedClientError>;
}

/// Production dialer targeting the vigil API's feed endpoint.
///
/// Stores the WebSocket base URL (e.g. `ws://host:3000`); each dial appends
/// the per-job path and a fresh `clientId` so the server can address close
/// frames to this specific observer.
pub struct FeedClient {
    ws_base_url: String,
}

impl FeedClient {
    /// Create a client targeting a server's WebSocket base URL.
    ///
    /// * `ws_base_url` - e.g. `ws://host:3000`, no trailing slash.
    pub fn new(ws_base_url: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into(),
        }
    }

    /// WebSocket base URL this client dials.
    pub fn ws_base_url(&self) -> &str {
        &self.ws_base_url
    }
}

#[async_trait]
impl FeedDialer for FeedClient {
    async fn dial(&self, job_id: DbId) -> Result<FeedStream, FeedClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = format!(
            "{}/api/v1/scans/{}/feed?clientId={}",
            self.ws_base_url, job_id, client_id
        );

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            FeedClientError::Connection(format!("Failed to connect to feed for job {job_id}: {e}"))
        })?;

        tracing::info!(job_id, client_id = %client_id, "Connected to scan feed");

        let frames = ws_stream.filter_map(move |frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Binary(_)) => {
                    // The feed is a text protocol; binary frames are ignored.
                    tracing::trace!(job_id, "Ignoring binary feed frame");
                    None
                }
                // Handled automatically by tungstenite.
                Ok(Message::Ping(_) | Message::Pong(_)) => None,
                Ok(Message::Close(frame)) => {
                    tracing::info!(job_id, ?frame, "Feed WebSocket closed by server");
                    None
                }
                Ok(Message::Frame(_)) => None,
                Err(e) => Some(Err(FeedClientError::Transport(e.to_string()))),
            }
        });

        Ok(Box::pin(frames))
    }
}
