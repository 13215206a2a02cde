//! Per-job push-feed connection manager.
//!
//! [`ConnectionManager`] owns one WebSocket connection per observed job:
//! establishment, heartbeat timeout detection, bounded exponential-backoff
//! reconnection, and teardown. A background sweep bounds memory by removing
//! dead bookkeeping. Created once per observer via
//! [`ConnectionManager::start`]; the returned `Arc` is cheap to clone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use vigil_core::types::{DbId, Timestamp};

use crate::client::{FeedDialer, FeedStream};
use crate::reconnect::{retry_delay, ReconnectConfig};
use crate::router::EventRouter;

/// Observer-side status of one job's push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Initial dial in progress.
    Connecting,
    /// Live and receiving frames.
    Connected,
    /// Lost; an automatic retry is scheduled.
    Reconnecting,
    /// Closed deliberately (or cancelled before a reconnect fired).
    Disconnected,
    /// Retries exhausted; only an explicit `connect` will try again.
    Error,
}

/// Tunable parameters for connection management.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// A connection with no inbound frame for this long is treated as dead.
    pub heartbeat_timeout: Duration,
    /// Backoff parameters for automatic reconnection.
    pub reconnect: ReconnectConfig,
    /// How often the sweep task scans for dead bookkeeping.
    pub sweep_interval: Duration,
    /// How long a disconnected entry may idle before the sweep drops it.
    pub idle_retention: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
            sweep_interval: Duration::from_secs(60),
            idle_retention: Duration::from_secs(300),
        }
    }
}

/// Internal bookkeeping for a single job's connection.
struct ManagedConnection {
    status: ConnectionStatus,
    retry_count: u32,
    last_activity: Timestamp,
    /// Per-connection cancellation token (child of the master token).
    cancel: CancellationToken,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

struct Inner {
    /// Active connection bookkeeping indexed by job id. Mutated only by the
    /// manager's own methods and connection tasks.
    connections: RwLock<HashMap<DbId, ManagedConnection>>,
    dialer: Arc<dyn FeedDialer>,
    router: Arc<EventRouter>,
    config: ConnectionConfig,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

/// Manages push-feed connections for all observed jobs.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create the manager and start its background sweep task.
    pub fn start(
        dialer: Arc<dyn FeedDialer>,
        router: Arc<EventRouter>,
        config: ConnectionConfig,
    ) -> Arc<Self> {
        let inner = Arc::new(Inner {
            connections: RwLock::new(HashMap::new()),
            dialer,
            router,
            config,
            cancel: CancellationToken::new(),
        });

        tokio::spawn(run_sweep(Arc::clone(&inner)));

        Arc::new(Self { inner })
    }

    /// Open (or confirm) the push connection for a job.
    ///
    /// Idempotent: while a connection is connecting, connected, or
    /// reconnecting this returns `true` without a second dial. A job in
    /// `Disconnected` or `Error` gets a fresh connection with a reset retry
    /// counter. Returns `false` only after the manager has been shut down.
    pub async fn connect(&self, job_id: DbId) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }

        let mut conns = self.inner.connections.write().await;
        let dead_entry = match conns.get(&job_id) {
            Some(existing) => match existing.status {
                ConnectionStatus::Connecting
                | ConnectionStatus::Connected
                | ConnectionStatus::Reconnecting => return true,
                ConnectionStatus::Disconnected | ConnectionStatus::Error => true,
            },
            None => false,
        };
        if dead_entry {
            if let Some(old) = conns.remove(&job_id) {
                old.cancel.cancel();
                if let Some(handle) = old.task_handle {
                    handle.abort();
                }
            }
        }

        let cancel = self.inner.cancel.child_token();
        conns.insert(
            job_id,
            ManagedConnection {
                status: ConnectionStatus::Connecting,
                retry_count: 0,
                last_activity: Utc::now(),
                cancel: cancel.clone(),
                task_handle: None,
            },
        );

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            run_connection(inner, job_id, cancel).await;
        });
        if let Some(entry) = conns.get_mut(&job_id) {
            entry.task_handle = Some(handle);
        }

        tracing::info!(job_id, "Feed connection task started");
        true
    }

    /// Close a job's connection and drop its bookkeeping.
    ///
    /// Safe to call for an unknown or already-removed id (no-op).
    pub async fn disconnect(&self, job_id: DbId) {
        let entry = self.inner.connections.write().await.remove(&job_id);
        if let Some(entry) = entry {
            entry.cancel.cancel();
            if let Some(handle) = entry.task_handle {
                handle.abort();
            }
            self.inner
                .router
                .notify_status(job_id, ConnectionStatus::Disconnected);
            tracing::info!(job_id, "Feed disconnected");
        }
    }

    /// Close every connection, waiting briefly for tasks to exit.
    pub async fn disconnect_all(&self) {
        let entries: Vec<(DbId, ManagedConnection)> = {
            let mut conns = self.inner.connections.write().await;
            conns.drain().collect()
        };
        for (job_id, entry) in entries {
            entry.cancel.cancel();
            if let Some(handle) = entry.task_handle {
                let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
            }
            self.inner
                .router
                .notify_status(job_id, ConnectionStatus::Disconnected);
        }
        tracing::info!("All feed connections closed");
    }

    /// Stop the manager for good: sweep task, then every connection.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.disconnect_all().await;
    }

    /// Current status of a job's connection, if one is tracked.
    pub async fn status(&self, job_id: DbId) -> Option<ConnectionStatus> {
        self.inner
            .connections
            .read()
            .await
            .get(&job_id)
            .map(|entry| entry.status)
    }

    /// Retry counter of a job's connection, if one is tracked.
    pub async fn retry_count(&self, job_id: DbId) -> Option<u32> {
        self.inner
            .connections
            .read()
            .await
            .get(&job_id)
            .map(|entry| entry.retry_count)
    }

    /// Jobs whose connection is live or trying to become live.
    pub async fn list_active(&self) -> Vec<DbId> {
        self.inner
            .connections
            .read()
            .await
            .iter()
            .filter_map(|(job_id, entry)| match entry.status {
                ConnectionStatus::Connecting
                | ConnectionStatus::Connected
                | ConnectionStatus::Reconnecting => Some(*job_id),
                _ => None,
            })
            .collect()
    }

    /// Total tracked connections, including dead bookkeeping the sweep has
    /// not reclaimed yet.
    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

enum ReadOutcome {
    Cancelled,
    TimedOut,
    Closed,
    TransportError(String),
}

/// Core connection loop: dial -> read frames -> reconnect with backoff.
///
/// Runs until cancelled, the entry is removed, or retries are exhausted.
async fn run_connection(inner: Arc<Inner>, job_id: DbId, cancel: CancellationToken) {
    loop {
        match inner.dialer.dial(job_id).await {
            Ok(stream) => {
                mark_connected(&inner, job_id).await;
                inner.router.notify_status(job_id, ConnectionStatus::Connected);

                match read_loop(&inner, job_id, stream, &cancel).await {
                    ReadOutcome::Cancelled => {
                        set_status(&inner, job_id, ConnectionStatus::Disconnected).await;
                        return;
                    }
                    ReadOutcome::TimedOut => {
                        inner.router.notify_error(job_id, "heartbeat timeout");
                    }
                    ReadOutcome::TransportError(msg) => {
                        inner.router.notify_error(job_id, &msg);
                    }
                    ReadOutcome::Closed => {}
                }
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Feed dial failed");
                inner.router.notify_error(job_id, &e.to_string());
            }
        }

        if cancel.is_cancelled() {
            set_status(&inner, job_id, ConnectionStatus::Disconnected).await;
            return;
        }

        // Reconnection evaluation.
        let attempt = {
            let mut conns = inner.connections.write().await;
            let Some(entry) = conns.get_mut(&job_id) else {
                // Bookkeeping was removed underneath us; nothing to do.
                return;
            };
            if entry.retry_count >= inner.config.reconnect.max_retries {
                entry.status = ConnectionStatus::Error;
                drop(conns);
                tracing::warn!(job_id, "Feed retries exhausted, giving up");
                inner.router.notify_status(job_id, ConnectionStatus::Error);
                return;
            }
            entry.retry_count += 1;
            entry.status = ConnectionStatus::Reconnecting;
            entry.retry_count
        };
        inner
            .router
            .notify_status(job_id, ConnectionStatus::Reconnecting);

        let delay = retry_delay(attempt, &inner.config.reconnect);
        tracing::info!(
            job_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to scan feed",
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                set_status(&inner, job_id, ConnectionStatus::Disconnected).await;
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Read frames until the connection dies, times out, or is cancelled.
///
/// Every inbound frame resets the heartbeat deadline; heartbeat messages
/// exist to guarantee a minimum cadence on otherwise-quiet feeds.
async fn read_loop(
    inner: &Arc<Inner>,
    job_id: DbId,
    mut stream: FeedStream,
    cancel: &CancellationToken,
) -> ReadOutcome {
    let timeout = inner.config.heartbeat_timeout;
    let mut deadline = tokio::time::Instant::now() + timeout;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return ReadOutcome::Cancelled,
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!(job_id, "Feed heartbeat timeout, treating connection as dead");
                return ReadOutcome::TimedOut;
            }
            frame = stream.next() => match frame {
                Some(Ok(text)) => {
                    deadline = tokio::time::Instant::now() + timeout;
                    touch(inner, job_id).await;
                    inner.router.route(job_id, &text);
                }
                Some(Err(e)) => {
                    tracing::error!(job_id, error = %e, "Feed receive error");
                    return ReadOutcome::TransportError(e.to_string());
                }
                None => {
                    tracing::info!(job_id, "Feed stream ended");
                    return ReadOutcome::Closed;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Background sweep
// ---------------------------------------------------------------------------

/// Periodically remove dead bookkeeping: `Error` entries, and
/// `Disconnected` entries idle past the retention window.
async fn run_sweep(inner: Arc<Inner>) {
    let mut ticker = tokio::time::interval(inner.config.sweep_interval);
    let idle_retention = chrono::Duration::from_std(inner.config.idle_retention)
        .unwrap_or_else(|_| chrono::Duration::seconds(300));

    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => return,
            _ = ticker.tick() => {
                let now = Utc::now();
                let mut swept = 0usize;
                let mut conns = inner.connections.write().await;
                conns.retain(|_, entry| {
                    let dead = match entry.status {
                        ConnectionStatus::Error => true,
                        ConnectionStatus::Disconnected => {
                            now - entry.last_activity > idle_retention
                        }
                        _ => false,
                    };
                    if dead {
                        entry.cancel.cancel();
                        if let Some(handle) = &entry.task_handle {
                            handle.abort();
                        }
                        swept += 1;
                    }
                    !dead
                });
                drop(conns);
                if swept > 0 {
                    tracing::debug!(count = swept, "Swept dead feed connections");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Bookkeeping helpers
// ---------------------------------------------------------------------------

async fn mark_connected(inner: &Arc<Inner>, job_id: DbId) {
    let mut conns = inner.connections.write().await;
    if let Some(entry) = conns.get_mut(&job_id) {
        entry.status = ConnectionStatus::Connected;
        entry.retry_count = 0;
        entry.last_activity = Utc::now();
    }
}

async fn set_status(inner: &Arc<Inner>, job_id: DbId, status: ConnectionStatus) {
    let mut conns = inner.connections.write().await;
    if let Some(entry) = conns.get_mut(&job_id) {
        entry.status = status;
    }
}

async fn touch(inner: &Arc<Inner>, job_id: DbId) {
    let mut conns = inner.connections.write().await;
    if let Some(entry) = conns.get_mut(&job_id) {
        entry.last_activity = Utc::now();
    }
}
