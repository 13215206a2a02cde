//! Component tests for `ConnectionManager`.
//!
//! These tests exercise the connection lifecycle against scripted dialers,
//! without any real WebSocket traffic: idempotent connect, heartbeat
//! timeout, bounded reconnection, explicit disconnect, and the sweep.
//! Paused tokio time makes the backoff and sweep windows instant.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vigil_core::types::DbId;
use vigil_feed::reconnect::ReconnectConfig;
use vigil_feed::{
    ConnectionConfig, ConnectionManager, ConnectionStatus, EventRouter, FeedClientError,
    FeedDialer, FeedStream,
};

// ---------------------------------------------------------------------------
// Scripted dialers
// ---------------------------------------------------------------------------

/// Dials succeed; the stream stays open and silent forever.
struct OpenDialer {
    dials: Arc<AtomicUsize>,
}

#[async_trait]
impl FeedDialer for OpenDialer {
    async fn dial(&self, _job_id: DbId) -> Result<FeedStream, FeedClientError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(futures::stream::pending()))
    }
}

/// Every dial fails at the transport level.
struct FailingDialer {
    dials: Arc<AtomicUsize>,
}

#[async_trait]
impl FeedDialer for FailingDialer {
    async fn dial(&self, job_id: DbId) -> Result<FeedStream, FeedClientError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        Err(FeedClientError::Connection(format!(
            "refused for job {job_id}"
        )))
    }
}

/// First dial yields a stream that closes immediately; later dials stay open.
struct FlakyThenOpenDialer {
    dials: Arc<AtomicUsize>,
}

#[async_trait]
impl FeedDialer for FlakyThenOpenDialer {
    async fn dial(&self, _job_id: DbId) -> Result<FeedStream, FeedClientError> {
        let attempt = self.dials.fetch_add(1, Ordering::SeqCst);
        if attempt == 0 {
            Ok(Box::pin(futures::stream::empty()))
        } else {
            Ok(Box::pin(futures::stream::pending()))
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Config with every background window pushed far away so individual tests
/// only observe the behaviour under test.
fn quiet_config() -> ConnectionConfig {
    ConnectionConfig {
        heartbeat_timeout: Duration::from_secs(3600),
        reconnect: ReconnectConfig::default(),
        sweep_interval: Duration::from_secs(86_400),
        idle_retention: Duration::from_secs(300),
    }
}

async fn wait_for_status(
    manager: &ConnectionManager,
    job_id: DbId,
    expected: ConnectionStatus,
    max: Duration,
) {
    let step = Duration::from_millis(50);
    let mut waited = Duration::ZERO;
    while manager.status(job_id).await != Some(expected) {
        assert!(
            waited < max,
            "Timed out waiting for job {job_id} to reach {expected:?}, last status: {:?}",
            manager.status(job_id).await,
        );
        tokio::time::sleep(step).await;
        waited += step;
    }
}

// ---------------------------------------------------------------------------
// Test: connect() is idempotent while a connection is active
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent_while_active() {
    let dials = Arc::new(AtomicUsize::new(0));
    let manager = ConnectionManager::start(
        Arc::new(OpenDialer {
            dials: Arc::clone(&dials),
        }),
        Arc::new(EventRouter::new()),
        quiet_config(),
    );

    assert!(manager.connect(7).await);
    wait_for_status(&manager, 7, ConnectionStatus::Connected, Duration::from_secs(5)).await;

    // Second connect while connected: true, and no second transport open.
    assert!(manager.connect(7).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(dials.load(Ordering::SeqCst), 1);
    assert_eq!(manager.status(7).await, Some(ConnectionStatus::Connected));
    assert_eq!(manager.list_active().await, vec![7]);
}

// ---------------------------------------------------------------------------
// Test: disconnect() on an unknown id is a no-op
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn disconnect_unknown_id_is_noop() {
    let manager = ConnectionManager::start(
        Arc::new(OpenDialer {
            dials: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(EventRouter::new()),
        quiet_config(),
    );

    manager.disconnect(999).await;

    assert_eq!(manager.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: disconnect() removes bookkeeping
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn disconnect_removes_bookkeeping() {
    let manager = ConnectionManager::start(
        Arc::new(OpenDialer {
            dials: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(EventRouter::new()),
        quiet_config(),
    );

    manager.connect(7).await;
    wait_for_status(&manager, 7, ConnectionStatus::Connected, Duration::from_secs(5)).await;

    manager.disconnect(7).await;

    assert_eq!(manager.status(7).await, None);
    assert!(manager.list_active().await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: retries are bounded; exhaustion parks the connection in Error
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn retry_exhaustion_enters_error_state() {
    let dials = Arc::new(AtomicUsize::new(0));
    let manager = ConnectionManager::start(
        Arc::new(FailingDialer {
            dials: Arc::clone(&dials),
        }),
        Arc::new(EventRouter::new()),
        quiet_config(),
    );

    manager.connect(7).await;
    // Backoff schedule is 1s + 2s + 4s; give it plenty of virtual time.
    wait_for_status(&manager, 7, ConnectionStatus::Error, Duration::from_secs(30)).await;

    // The initial dial plus max_retries reconnect attempts.
    assert_eq!(dials.load(Ordering::SeqCst), 4);
    assert_eq!(manager.retry_count(7).await, Some(3));

    // No further automatic attempt is ever scheduled.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(dials.load(Ordering::SeqCst), 4);
    assert!(manager.list_active().await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: a dropped stream reconnects and the retry counter resets on success
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn dropped_stream_reconnects_and_resets_retries() {
    let dials = Arc::new(AtomicUsize::new(0));
    let manager = ConnectionManager::start(
        Arc::new(FlakyThenOpenDialer {
            dials: Arc::clone(&dials),
        }),
        Arc::new(EventRouter::new()),
        quiet_config(),
    );

    manager.connect(7).await;

    // Wait for the second dial (the reconnect) rather than the first
    // transient Connected window.
    let mut waited = Duration::ZERO;
    while dials.load(Ordering::SeqCst) < 2 {
        assert!(waited < Duration::from_secs(10), "Reconnect never happened");
        tokio::time::sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }
    wait_for_status(&manager, 7, ConnectionStatus::Connected, Duration::from_secs(10)).await;

    assert_eq!(dials.load(Ordering::SeqCst), 2);
    assert_eq!(manager.retry_count(7).await, Some(0));
}

// ---------------------------------------------------------------------------
// Test: heartbeat silence is treated as a dead connection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn heartbeat_timeout_kills_silent_connection() {
    let dials = Arc::new(AtomicUsize::new(0));
    let config = ConnectionConfig {
        heartbeat_timeout: Duration::from_secs(30),
        reconnect: ReconnectConfig {
            max_retries: 0,
            ..Default::default()
        },
        sweep_interval: Duration::from_secs(86_400),
        idle_retention: Duration::from_secs(300),
    };
    let manager = ConnectionManager::start(
        Arc::new(OpenDialer {
            dials: Arc::clone(&dials),
        }),
        Arc::new(EventRouter::new()),
        config,
    );

    manager.connect(7).await;
    wait_for_status(&manager, 7, ConnectionStatus::Connected, Duration::from_secs(5)).await;

    // The silent stream passes the 30s heartbeat window; with zero retries
    // the connection goes straight to Error.
    wait_for_status(&manager, 7, ConnectionStatus::Error, Duration::from_secs(60)).await;
    assert_eq!(dials.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Test: an explicit connect() after Error dials again
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn explicit_connect_after_error_dials_again() {
    let dials = Arc::new(AtomicUsize::new(0));
    let config = ConnectionConfig {
        reconnect: ReconnectConfig {
            max_retries: 0,
            ..Default::default()
        },
        ..quiet_config()
    };
    let manager = ConnectionManager::start(
        Arc::new(FailingDialer {
            dials: Arc::clone(&dials),
        }),
        Arc::new(EventRouter::new()),
        config,
    );

    manager.connect(7).await;
    wait_for_status(&manager, 7, ConnectionStatus::Error, Duration::from_secs(10)).await;
    assert_eq!(dials.load(Ordering::SeqCst), 1);

    // The caller explicitly asks again: a fresh connection attempt runs.
    assert!(manager.connect(7).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(dials.load(Ordering::SeqCst) >= 2);
}

// ---------------------------------------------------------------------------
// Test: the sweep reclaims Error bookkeeping
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn sweep_removes_error_entries() {
    let config = ConnectionConfig {
        reconnect: ReconnectConfig {
            max_retries: 0,
            ..Default::default()
        },
        sweep_interval: Duration::from_secs(60),
        ..quiet_config()
    };
    let manager = ConnectionManager::start(
        Arc::new(FailingDialer {
            dials: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(EventRouter::new()),
        config,
    );

    manager.connect(7).await;
    wait_for_status(&manager, 7, ConnectionStatus::Error, Duration::from_secs(10)).await;
    assert_eq!(manager.connection_count().await, 1);

    // The next sweep tick reclaims the dead entry.
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(manager.connection_count().await, 0);
    assert_eq!(manager.status(7).await, None);
}

// ---------------------------------------------------------------------------
// Test: disconnect_all() clears every connection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn disconnect_all_clears_everything() {
    let manager = ConnectionManager::start(
        Arc::new(OpenDialer {
            dials: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(EventRouter::new()),
        quiet_config(),
    );

    manager.connect(1).await;
    manager.connect(2).await;
    manager.connect(3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(manager.connection_count().await, 3);

    manager.disconnect_all().await;

    assert_eq!(manager.connection_count().await, 0);
    assert!(manager.list_active().await.is_empty());
}
