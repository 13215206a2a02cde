//! Reconciliation between push delivery and pull snapshots.
//!
//! The push feed is fast but lossy (reconnect gaps, dropped frames); the
//! periodic snapshot is slow but complete. [`SyncCoordinator`] feeds both
//! into the [`JobStore`] reducer, keeps the connection set aligned with the
//! running job set, and turns status transitions into completion callbacks
//! and connection teardown.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use vigil_core::scan_job::JobStatus;
use vigil_core::types::DbId;

use crate::manager::{ConnectionManager, ConnectionStatus};
use crate::messages::ProgressEvent;
use crate::router::EventRouter;
use crate::store::{JobStore, JobView, QueueEntryView, StoreAction, Transition};

/// One full snapshot of live server-side state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub jobs: Vec<JobView>,
    pub queued: Vec<QueueEntryView>,
}

/// Errors from a snapshot fetch.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("Snapshot request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("Snapshot API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Produces full snapshots of current job/queue state.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Snapshot, SnapshotError>;
}

/// Tunable parameters for the coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Snapshot cadence while any job runs or any scan is queued.
    pub active_interval: Duration,
    /// Snapshot cadence while everything is quiet.
    pub idle_interval: Duration,
    /// How often terminal jobs are pruned from the store.
    pub prune_interval: Duration,
    /// Delay between a job succeeding and its feed teardown, so trailing
    /// messages can drain.
    pub disconnect_grace: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            active_interval: Duration::from_secs(3),
            idle_interval: Duration::from_secs(30),
            prune_interval: Duration::from_secs(5),
            disconnect_grace: Duration::from_secs(2),
        }
    }
}

type CompletionCallback = Arc<dyn Fn(DbId) + Send + Sync>;

/// Bridges push delivery and pull snapshots for one observer.
pub struct SyncCoordinator {
    store: Arc<JobStore>,
    manager: Arc<ConnectionManager>,
    source: Arc<dyn SnapshotSource>,
    config: SyncConfig,
    on_complete: Mutex<Option<CompletionCallback>>,
    /// Jobs with a grace-delayed disconnect in flight; the snapshot
    /// reconciler must not tear these down early.
    pending_disconnects: Arc<Mutex<HashSet<DbId>>>,
    cancel: CancellationToken,
}

impl SyncCoordinator {
    /// Create a coordinator. Call [`attach_router`](Self::attach_router) to
    /// receive push events and [`start`](Self::start) to begin polling.
    pub fn new(
        store: Arc<JobStore>,
        manager: Arc<ConnectionManager>,
        source: Arc<dyn SnapshotSource>,
        config: SyncConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            manager,
            source,
            config,
            on_complete: Mutex::new(None),
            pending_disconnects: Arc::new(Mutex::new(HashSet::new())),
            cancel: CancellationToken::new(),
        })
    }

    /// Register the callback fired exactly once per job that succeeds.
    pub fn set_completion_callback(&self, callback: impl Fn(DbId) + Send + Sync + 'static) {
        *self
            .on_complete
            .lock()
            .expect("completion callback lock poisoned") = Some(Arc::new(callback));
    }

    /// Subscribe this coordinator to a router's validated progress events
    /// and connection status changes.
    ///
    /// A connection entering `Error` flips the store into polling-fallback
    /// mode (push exhausted its retries; the snapshot poll is now the only
    /// delivery path for that job); a successful open flips it back.
    pub fn attach_router(self: &Arc<Self>, router: &EventRouter) {
        let this = Arc::clone(self);
        router.on_progress(move |event| this.handle_push_event(event));

        let this = Arc::clone(self);
        router.on_status_change(move |_job_id, status| match status {
            ConnectionStatus::Error => {
                this.store.dispatch(StoreAction::SetPolling(true));
            }
            ConnectionStatus::Connected => {
                this.store.dispatch(StoreAction::SetPolling(false));
            }
            _ => {}
        });
    }

    /// Spawn the snapshot poll loop and the prune loop.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_poll_loop().await });
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_prune_loop().await });
    }

    /// Stop both loops. Connections are left to the manager's owner.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Shared store handle, for read access to derived views.
    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    // ---- push path ----

    fn handle_push_event(&self, event: &ProgressEvent) {
        let transitions = self
            .store
            .dispatch(StoreAction::UpsertFromEvent(event.clone()));
        self.handle_transitions(&transitions);
    }

    /// React to status transitions regardless of which path produced them.
    fn handle_transitions(&self, transitions: &[Transition]) {
        for transition in transitions {
            match transition.to {
                JobStatus::Succeeded => {
                    if let Some(callback) = self
                        .on_complete
                        .lock()
                        .expect("completion callback lock poisoned")
                        .clone()
                    {
                        callback(transition.job_id);
                    }
                    self.schedule_grace_disconnect(transition.job_id);
                }
                JobStatus::Failed | JobStatus::Cancelled => {
                    // No grace, no callback: tear the feed down right away.
                    let manager = Arc::clone(&self.manager);
                    let job_id = transition.job_id;
                    tokio::spawn(async move {
                        manager.disconnect(job_id).await;
                    });
                }
                JobStatus::Queued | JobStatus::Running => {}
            }
        }
    }

    /// Disconnect a succeeded job's feed after the grace delay, so trailing
    /// messages (final progress, summaries) still arrive.
    fn schedule_grace_disconnect(&self, job_id: DbId) {
        self.pending_disconnects
            .lock()
            .expect("pending disconnect lock poisoned")
            .insert(job_id);

        let manager = Arc::clone(&self.manager);
        let pending = Arc::clone(&self.pending_disconnects);
        let grace = self.config.disconnect_grace;

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            manager.disconnect(job_id).await;
            pending
                .lock()
                .expect("pending disconnect lock poisoned")
                .remove(&job_id);
        });
    }

    // ---- pull path ----

    async fn run_poll_loop(&self) {
        tracing::info!("Sync coordinator started");
        // An immediate fetch before the first timer fires.
        self.refresh().await;

        loop {
            // Recomputing the interval each iteration re-arms the timer
            // atomically: one loop, never two overlapping timers.
            let interval = if self.store.state().has_outstanding_work() {
                self.config.active_interval
            } else {
                self.config.idle_interval
            };

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Sync coordinator shutting down");
                    return;
                }
                _ = tokio::time::sleep(interval) => {
                    self.refresh().await;
                }
            }
        }
    }

    async fn run_prune_loop(&self) {
        let mut ticker = tokio::time::interval(self.config.prune_interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {
                    self.store.dispatch(StoreAction::PruneTerminal { now: Utc::now() });
                }
            }
        }
    }

    /// One snapshot cycle: fetch, replace store state, reconcile connections.
    ///
    /// Fetch failures are logged and skipped; the next tick is the retry.
    pub async fn refresh(&self) {
        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Snapshot fetch failed");
                return;
            }
        };

        let transitions = self.store.dispatch(StoreAction::ReplaceAll(snapshot.jobs));
        self.store
            .dispatch(StoreAction::ReplaceQueued(snapshot.queued));
        self.handle_transitions(&transitions);
        self.reconcile_connections().await;
    }

    /// Align the connection set with the fresh running set: connect every
    /// running job without an active feed, drop every active feed whose job
    /// is no longer running (stale or completed elsewhere).
    async fn reconcile_connections(&self) {
        let running: HashSet<DbId> = self
            .store
            .state()
            .running()
            .iter()
            .map(|job| job.job_id)
            .collect();

        for job_id in &running {
            // Idempotent: already-active jobs are untouched.
            self.manager.connect(*job_id).await;
        }

        let in_grace: HashSet<DbId> = self
            .pending_disconnects
            .lock()
            .expect("pending disconnect lock poisoned")
            .clone();

        for job_id in self.manager.list_active().await {
            if !running.contains(&job_id) && !in_grace.contains(&job_id) {
                self.manager.disconnect(job_id).await;
            }
        }
    }
}
