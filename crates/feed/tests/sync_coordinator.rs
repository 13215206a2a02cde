//! Component tests for `SyncCoordinator`.
//!
//! A fake snapshot source and a scripted dialer stand in for the server, so
//! these tests pin down the reconcile-and-transition behaviour end to end:
//! connect/disconnect diffing against the running set, the exactly-once
//! completion callback, the post-success grace window, and immediate
//! teardown on failure.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use vigil_core::scan_job::JobStatus;
use vigil_core::types::{DbId, Timestamp};
use vigil_feed::reconnect::ReconnectConfig;
use vigil_feed::store::QueueEntryView;
use vigil_feed::sync::SnapshotError;
use vigil_feed::{
    ConnectionConfig, ConnectionManager, ConnectionStatus, EventRouter, FeedClientError,
    FeedDialer, FeedStream, JobStore, JobView, RetentionConfig, Snapshot, SnapshotSource,
    SyncConfig, SyncCoordinator,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct OpenDialer;

#[async_trait]
impl FeedDialer for OpenDialer {
    async fn dial(&self, _job_id: DbId) -> Result<FeedStream, FeedClientError> {
        Ok(Box::pin(futures::stream::pending()))
    }
}

/// Snapshot source returning a programmable snapshot (or a 500).
struct FakeSource {
    snapshot: Mutex<Option<Snapshot>>,
    fetches: AtomicUsize,
}

impl FakeSource {
    fn new(snapshot: Snapshot) -> Arc<Self> {
        Arc::new(Self {
            snapshot: Mutex::new(Some(snapshot)),
            fetches: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            snapshot: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        })
    }

    fn set(&self, snapshot: Snapshot) {
        *self.snapshot.lock().unwrap() = Some(snapshot);
    }
}

#[async_trait]
impl SnapshotSource for FakeSource {
    async fn fetch(&self) -> Result<Snapshot, SnapshotError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.snapshot.lock().unwrap().clone() {
            Some(snapshot) => Ok(snapshot),
            None => Err(SnapshotError::Api {
                status: 500,
                body: "boom".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn at(secs: i64) -> Timestamp {
    Utc.timestamp_opt(1_770_000_000 + secs, 0).unwrap()
}

fn running_job(job_id: DbId, ts: Timestamp) -> JobView {
    JobView {
        job_id,
        image_ref: format!("app/svc-{job_id}:1.0"),
        image_name: Some(format!("service {job_id}")),
        status: JobStatus::Running,
        progress: 10,
        step: None,
        error: None,
        started_at: Some(ts),
        last_updated_at: ts,
        queue_position: None,
        estimated_wait_secs: None,
    }
}

fn snapshot_of(jobs: Vec<JobView>) -> Snapshot {
    Snapshot {
        jobs,
        queued: Vec::<QueueEntryView>::new(),
    }
}

fn progress_json(job_id: DbId, status: &str, progress: i16, ts: &str) -> String {
    format!(
        r#"{{"type":"progress","request_id":{job_id},"scan_id":"app/svc-{job_id}:1.0","status":"{status}","progress":{progress},"timestamp":"{ts}"}}"#
    )
}

struct Fixture {
    router: Arc<EventRouter>,
    manager: Arc<ConnectionManager>,
    coordinator: Arc<SyncCoordinator>,
    source: Arc<FakeSource>,
}

fn fixture(source: Arc<FakeSource>) -> Fixture {
    let router = Arc::new(EventRouter::new());
    let manager = ConnectionManager::start(
        Arc::new(OpenDialer),
        Arc::clone(&router),
        ConnectionConfig {
            heartbeat_timeout: Duration::from_secs(3600),
            reconnect: ReconnectConfig::default(),
            sweep_interval: Duration::from_secs(86_400),
            idle_retention: Duration::from_secs(300),
        },
    );
    let store = Arc::new(JobStore::new(RetentionConfig::default()));
    let coordinator = SyncCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&manager),
        Arc::clone(&source) as Arc<dyn SnapshotSource>,
        SyncConfig::default(),
    );
    coordinator.attach_router(&router);
    Fixture {
        router,
        manager,
        coordinator,
        source,
    }
}

// ---------------------------------------------------------------------------
// Test: refresh connects running jobs and disconnects stale ones
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn refresh_reconciles_connection_set() {
    let source = FakeSource::new(snapshot_of(vec![
        running_job(1, at(0)),
        running_job(2, at(0)),
    ]));
    let fx = fixture(Arc::clone(&source));

    fx.coordinator.refresh().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut active = fx.manager.list_active().await;
    active.sort();
    assert_eq!(active, vec![1, 2]);

    // Job 1 vanished from the running set (completed elsewhere).
    source.set(snapshot_of(vec![running_job(2, at(10))]));
    fx.coordinator.refresh().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(fx.manager.list_active().await, vec![2]);
    assert_eq!(fx.manager.status(1).await, None);
}

// ---------------------------------------------------------------------------
// Test: completion callback fires exactly once, disconnect honours grace
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn success_fires_callback_once_and_disconnects_after_grace() {
    let source = FakeSource::new(snapshot_of(vec![running_job(7, at(0))]));
    let fx = fixture(source);

    let completions = Arc::new(AtomicUsize::new(0));
    let completions_clone = Arc::clone(&completions);
    fx.coordinator.set_completion_callback(move |_job_id| {
        completions_clone.fetch_add(1, Ordering::SeqCst);
    });

    fx.coordinator.refresh().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fx.manager.list_active().await, vec![7]);

    // The job succeeds via push.
    fx.router
        .route(7, &progress_json(7, "succeeded", 100, "2026-03-01T10:00:10Z"));

    assert_eq!(completions.load(Ordering::SeqCst), 1);

    // Well inside the 2s grace window the feed is still up.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(
        fx.manager.status(7).await,
        Some(ConnectionStatus::Connected)
    );

    // Past the grace window it is torn down.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(fx.manager.status(7).await, None);

    // A duplicate terminal message must not re-fire the callback.
    fx.router
        .route(7, &progress_json(7, "succeeded", 100, "2026-03-01T10:00:12Z"));
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Test: a snapshot during the grace window does not disconnect early
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn snapshot_during_grace_window_keeps_feed_up() {
    let source = FakeSource::new(snapshot_of(vec![running_job(7, at(0))]));
    let fx = fixture(Arc::clone(&source));

    fx.coordinator.refresh().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    fx.router
        .route(7, &progress_json(7, "succeeded", 100, "2026-03-01T10:00:10Z"));

    // A fresh snapshot no longer lists job 7 as running, but the grace
    // window owns its teardown.
    source.set(snapshot_of(vec![]));
    fx.coordinator.refresh().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        fx.manager.status(7).await,
        Some(ConnectionStatus::Connected)
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(fx.manager.status(7).await, None);
}

// ---------------------------------------------------------------------------
// Test: failure disconnects immediately with no callback
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn failure_disconnects_immediately_without_callback() {
    let source = FakeSource::new(snapshot_of(vec![running_job(8, at(0))]));
    let fx = fixture(source);

    let completions = Arc::new(AtomicUsize::new(0));
    let completions_clone = Arc::clone(&completions);
    fx.coordinator.set_completion_callback(move |_job_id| {
        completions_clone.fetch_add(1, Ordering::SeqCst);
    });

    fx.coordinator.refresh().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fx.manager.list_active().await, vec![8]);

    fx.router.route(
        8,
        &progress_json(8, "failed", 60, "2026-03-01T10:00:10Z"),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(fx.manager.status(8).await, None);
    assert_eq!(completions.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Test: starting the coordinator issues an immediate fetch
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn start_issues_immediate_fetch() {
    let source = FakeSource::new(snapshot_of(vec![]));
    let fx = fixture(Arc::clone(&source));

    fx.coordinator.start();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(source.fetches.load(Ordering::SeqCst) >= 1);
    fx.coordinator.stop();
}

// ---------------------------------------------------------------------------
// Test: snapshot failures are tolerated and retried on the next tick
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn snapshot_failure_is_tolerated() {
    let source = FakeSource::failing();
    let fx = fixture(Arc::clone(&source));

    fx.coordinator.refresh().await;
    assert!(fx.coordinator.store().state().is_empty());

    // The source recovers; the next refresh heals the view.
    source.set(snapshot_of(vec![running_job(3, at(0))]));
    fx.coordinator.refresh().await;
    assert_eq!(fx.coordinator.store().state().running().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: push events flow through the router into the store
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn push_events_update_the_store() {
    let source = FakeSource::new(snapshot_of(vec![running_job(5, at(0))]));
    let fx = fixture(source);

    fx.coordinator.refresh().await;
    fx.router
        .route(5, &progress_json(5, "running", 85, "2026-03-01T10:00:20Z"));

    let state = fx.coordinator.store().state();
    let job = state.get(5).unwrap();
    assert_eq!(job.progress, 85);
    // Fields the event does not carry survive the merge.
    assert_eq!(job.image_name.as_deref(), Some("service 5"));
}
