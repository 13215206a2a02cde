use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};
use vigil_core::types::{DbId, Timestamp};
use vigil_pipeline::{ProgressFeed, ProgressUpdate};

use super::progress_payload;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single observer feed connection.
pub struct WsConnection {
    /// The scan job this observer is watching.
    pub job_id: DbId,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// Manages all active observer feed connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application. One job may have many observers; each
/// connection is keyed by its own id and tagged with the job it watches.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new feed connection for a job.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(&self, conn_id: String, job_id: DbId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            job_id,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID.
    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Send a message to every observer of a specific job.
    ///
    /// Connections whose send channels are closed are silently skipped
    /// (they are cleaned up on their next receive loop iteration).
    /// Returns the number of connections the message was sent to.
    pub async fn send_to_job(&self, job_id: DbId, message: Message) -> usize {
        let conns = self.connections.read().await;
        let mut count = 0;
        for conn in conns.values() {
            if conn.job_id == job_id {
                let _ = conn.sender.send(message.clone());
                count += 1;
            }
        }
        count
    }

    /// Broadcast a message to every connected observer.
    pub async fn broadcast(&self, message: Message) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(message.clone());
        }
    }

    /// Number of observers currently watching a job.
    pub async fn observer_count(&self, job_id: DbId) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|conn| conn.job_id == job_id)
            .count()
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all observers before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all observer feed connections");
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressFeed for WsManager {
    /// Push one job update to that job's observers as a wire `progress`
    /// message. This is the `ProgressFeed` capability the pipeline writes
    /// terminal updates through.
    async fn publish(&self, update: ProgressUpdate) {
        let payload = progress_payload(&update);
        self.send_to_job(update.job_id, Message::Text(payload.to_string().into()))
            .await;
    }
}
