//! Reducer-driven store of observed job state.
//!
//! The store is the observer's working copy of job state — never the system
//! of record. All mutation goes through a pure transition function
//! ([`apply`]) over [`StoreAction`]s, and [`JobStore`] keeps an append-only
//! action log so any state can be reproduced by replay.

use std::collections::HashMap;
use std::sync::Mutex;

use vigil_core::scan_job::{merge_progress, state_machine, JobStatus};
use vigil_core::types::{DbId, Timestamp};

use crate::messages::ProgressEvent;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Observed state of one scan job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobView {
    pub job_id: DbId,
    /// Canonical `name:tag` identity of the scanned image.
    pub image_ref: String,
    /// Human-readable display name; preserved across event merges.
    pub image_name: Option<String>,
    pub status: JobStatus,
    pub progress: i16,
    pub step: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<Timestamp>,
    pub last_updated_at: Timestamp,
    pub queue_position: Option<i32>,
    pub estimated_wait_secs: Option<i32>,
}

/// Observed state of one queued scan.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct QueueEntryView {
    pub job_id: DbId,
    pub batch_id: DbId,
    pub image_ref: String,
    pub queue_position: i32,
    pub estimated_wait_secs: i32,
}

/// The whole observed state: jobs keyed by identity, the queued set, and
/// whether the observer is in polling-fallback mode.
#[derive(Debug, Clone, Default)]
pub struct JobsState {
    jobs: HashMap<DbId, JobView>,
    queued: Vec<QueueEntryView>,
    polling: bool,
}

impl JobsState {
    /// Look up one job.
    pub fn get(&self, job_id: DbId) -> Option<&JobView> {
        self.jobs.get(&job_id)
    }

    /// Number of jobs currently held.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store holds no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Derived view: all jobs currently running.
    pub fn running(&self) -> Vec<&JobView> {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .collect()
    }

    /// Derived view: all jobs not currently running.
    pub fn completed(&self) -> Vec<&JobView> {
        self.jobs
            .values()
            .filter(|j| j.status != JobStatus::Running)
            .collect()
    }

    /// The queued set from the last snapshot.
    pub fn queued(&self) -> &[QueueEntryView] {
        &self.queued
    }

    /// Whether the observer is in polling-fallback mode.
    pub fn polling(&self) -> bool {
        self.polling
    }

    /// Whether any work is outstanding (drives the snapshot cadence).
    pub fn has_outstanding_work(&self) -> bool {
        !self.queued.is_empty() || self.jobs.values().any(|j| j.status == JobStatus::Running)
    }
}

// ---------------------------------------------------------------------------
// Actions and reducer
// ---------------------------------------------------------------------------

/// Retention windows for terminal jobs in the live view.
///
/// Configurable defaults rather than fixed constants: succeeded jobs linger
/// briefly so the observer sees the final state, failures linger longer so
/// the error is readable.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// How long a succeeded job stays after its last update.
    pub success: chrono::Duration,
    /// How long a failed or cancelled job stays after its last update.
    pub failure: chrono::Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            success: chrono::Duration::seconds(5),
            failure: chrono::Duration::seconds(30),
        }
    }
}

/// All mutations the store understands.
#[derive(Debug, Clone)]
pub enum StoreAction {
    /// Merge a validated push event into the matching job.
    UpsertFromEvent(ProgressEvent),
    /// Insert or overwrite one job wholesale.
    AddJob(JobView),
    /// Remove one job.
    RemoveJob(DbId),
    /// Re-key the job set from a full snapshot.
    ReplaceAll(Vec<JobView>),
    /// Replace the queued set from a full snapshot.
    ReplaceQueued(Vec<QueueEntryView>),
    /// Drop terminal jobs whose retention window has passed.
    PruneTerminal { now: Timestamp },
    /// Flag polling-fallback mode for consumers.
    SetPolling(bool),
}

/// A status change observed while applying an action.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub job_id: DbId,
    pub from: Option<JobStatus>,
    pub to: JobStatus,
}

/// Pure transition function: `state × action → state`.
///
/// Never mutates its input; callers that need change detection diff the
/// result (see [`JobStore::dispatch`]).
pub fn apply(state: &JobsState, action: &StoreAction, retention: &RetentionConfig) -> JobsState {
    let mut next = state.clone();
    match action {
        StoreAction::UpsertFromEvent(event) => {
            upsert_from_event(&mut next.jobs, event);
        }
        StoreAction::AddJob(job) => {
            next.jobs.insert(job.job_id, job.clone());
        }
        StoreAction::RemoveJob(job_id) => {
            next.jobs.remove(job_id);
        }
        StoreAction::ReplaceAll(incoming) => {
            next.jobs = replace_all(&state.jobs, incoming);
        }
        StoreAction::ReplaceQueued(queued) => {
            next.queued = queued.clone();
        }
        StoreAction::PruneTerminal { now } => {
            next.jobs.retain(|_, job| {
                let window = match job.status {
                    JobStatus::Succeeded => retention.success,
                    JobStatus::Failed | JobStatus::Cancelled => retention.failure,
                    // Running and queued jobs are never pruned.
                    JobStatus::Running | JobStatus::Queued => return true,
                };
                *now - job.last_updated_at < window
            });
        }
        StoreAction::SetPolling(polling) => {
            next.polling = *polling;
        }
    }
    next
}

/// Merge an inbound progress event, preserving fields the event does not
/// carry and refusing to regress on stale timestamps or terminal states.
fn upsert_from_event(jobs: &mut HashMap<DbId, JobView>, event: &ProgressEvent) {
    match jobs.get_mut(&event.job_id) {
        Some(existing) => {
            // Staleness guard: an event older than what we already display
            // must not regress status or progress.
            if event.timestamp < existing.last_updated_at {
                return;
            }
            // Status only moves along the forward-only lifecycle.
            if event.status != existing.status
                && state_machine::can_transition(existing.status, event.status)
            {
                existing.status = event.status;
            }
            existing.progress = merge_progress(existing.progress, event.progress);
            if event.step.is_some() {
                existing.step = event.step.clone();
            }
            if event.error.is_some() {
                existing.error = event.error.clone();
            }
            if existing.status != JobStatus::Queued {
                existing.queue_position = None;
                existing.estimated_wait_secs = None;
            }
            existing.last_updated_at = event.timestamp;
        }
        None => {
            // First sight of this job via push: synthesize a view with a
            // blank display name; the next snapshot fills the rest in.
            jobs.insert(
                event.job_id,
                JobView {
                    job_id: event.job_id,
                    image_ref: event.scan_ref.clone(),
                    image_name: None,
                    status: event.status,
                    progress: event.progress.clamp(0, 100),
                    step: event.step.clone(),
                    error: event.error.clone(),
                    started_at: None,
                    last_updated_at: event.timestamp,
                    queue_position: None,
                    estimated_wait_secs: None,
                },
            );
        }
    }
}

/// Re-key the job set from a snapshot.
///
/// The live snapshot only carries non-terminal work, so a literal full
/// replace would evict terminal jobs before their retention window. Rules:
/// - incoming rows win unless the local copy is strictly newer;
/// - local terminal jobs absent from the snapshot stay until pruned;
/// - local non-terminal jobs absent from the snapshot are dropped (they
///   finished or vanished while we were not looking).
fn replace_all(
    current: &HashMap<DbId, JobView>,
    incoming: &[JobView],
) -> HashMap<DbId, JobView> {
    let mut next: HashMap<DbId, JobView> = HashMap::with_capacity(incoming.len());

    for job in incoming {
        match current.get(&job.job_id) {
            Some(existing) if existing.last_updated_at > job.last_updated_at => {
                next.insert(job.job_id, existing.clone());
            }
            _ => {
                next.insert(job.job_id, job.clone());
            }
        }
    }

    for (job_id, existing) in current {
        if existing.status.is_terminal() && !next.contains_key(job_id) {
            next.insert(*job_id, existing.clone());
        }
    }

    next
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

struct StoreInner {
    state: JobsState,
    log: Vec<StoreAction>,
}

/// Serialized access to the observed state plus the append-only action log.
///
/// The store is the only shared mutable structure on the delivery side;
/// everything goes through [`dispatch`](Self::dispatch), so concurrent timer
/// callbacks interleave but each mutation is atomic.
pub struct JobStore {
    inner: Mutex<StoreInner>,
    retention: RetentionConfig,
}

impl JobStore {
    /// Create an empty store with the given retention windows.
    pub fn new(retention: RetentionConfig) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                state: JobsState::default(),
                log: Vec::new(),
            }),
            retention,
        }
    }

    /// Apply one action and return the status transitions it caused.
    pub fn dispatch(&self, action: StoreAction) -> Vec<Transition> {
        let mut inner = self.inner.lock().expect("job store lock poisoned");
        let next = apply(&inner.state, &action, &self.retention);
        let transitions = diff_transitions(&inner.state, &next);
        inner.log.push(action);
        inner.state = next;
        transitions
    }

    /// Clone the current state.
    pub fn state(&self) -> JobsState {
        self.inner
            .lock()
            .expect("job store lock poisoned")
            .state
            .clone()
    }

    /// Number of actions applied so far.
    pub fn log_len(&self) -> usize {
        self.inner.lock().expect("job store lock poisoned").log.len()
    }

    /// Rebuild state by replaying the action log from scratch.
    ///
    /// The result must equal [`state`](Self::state); used by tests to pin
    /// down reducer purity.
    pub fn replay(&self) -> JobsState {
        let inner = self.inner.lock().expect("job store lock poisoned");
        let mut state = JobsState::default();
        for action in &inner.log {
            state = apply(&state, action, &self.retention);
        }
        state
    }
}

/// Status changes between two states, for jobs present in the new state.
fn diff_transitions(old: &JobsState, new: &JobsState) -> Vec<Transition> {
    let mut transitions = Vec::new();
    for (job_id, job) in &new.jobs {
        let from = old.jobs.get(job_id).map(|j| j.status);
        if from != Some(job.status) {
            transitions.push(Transition {
                job_id: *job_id,
                from,
                to: job.status,
            });
        }
    }
    transitions
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_770_000_000 + secs, 0).unwrap()
    }

    fn event(job_id: DbId, status: JobStatus, progress: i16, ts: Timestamp) -> ProgressEvent {
        ProgressEvent {
            job_id,
            scan_ref: "app/web:1.0".into(),
            status,
            progress,
            step: None,
            error: None,
            timestamp: ts,
        }
    }

    fn view(job_id: DbId, status: JobStatus, ts: Timestamp) -> JobView {
        JobView {
            job_id,
            image_ref: "app/web:1.0".into(),
            image_name: Some("web frontend".into()),
            status,
            progress: 0,
            step: None,
            error: None,
            started_at: Some(ts),
            last_updated_at: ts,
            queue_position: None,
            estimated_wait_secs: None,
        }
    }

    fn store() -> JobStore {
        JobStore::new(RetentionConfig::default())
    }

    // -- UpsertFromEvent ------------------------------------------------------

    #[test]
    fn upsert_synthesizes_missing_job_with_blank_name() {
        let store = store();
        store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Running,
            25,
            at(0),
        )));

        let state = store.state();
        let job = state.get(7).unwrap();
        assert_eq!(job.image_ref, "app/web:1.0");
        assert!(job.image_name.is_none());
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.progress, 25);
    }

    #[test]
    fn upsert_preserves_name_and_started_at() {
        let store = store();
        store.dispatch(StoreAction::AddJob(view(7, JobStatus::Running, at(0))));
        store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Running,
            60,
            at(5),
        )));

        let state = store.state();
        let job = state.get(7).unwrap();
        assert_eq!(job.image_name.as_deref(), Some("web frontend"));
        assert_eq!(job.started_at, Some(at(0)));
        assert_eq!(job.progress, 60);
        assert_eq!(job.last_updated_at, at(5));
    }

    #[test]
    fn stale_event_does_not_regress() {
        let store = store();
        store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Running,
            80,
            at(10),
        )));
        // An older event arrives late, out of order.
        store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Queued,
            30,
            at(4),
        )));

        let state = store.state();
        let job = state.get(7).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.progress, 80);
        assert_eq!(job.last_updated_at, at(10));
    }

    #[test]
    fn progress_is_monotone_even_for_fresh_events() {
        let store = store();
        store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Running,
            80,
            at(10),
        )));
        // Newer timestamp but smaller progress value.
        store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Running,
            70,
            at(12),
        )));

        assert_eq!(store.state().get(7).unwrap().progress, 80);
    }

    #[test]
    fn terminal_status_never_transitions_again() {
        let store = store();
        store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Failed,
            50,
            at(10),
        )));
        store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Running,
            90,
            at(20),
        )));

        assert_eq!(store.state().get(7).unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn invalid_forward_jump_is_ignored() {
        let store = store();
        store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Queued,
            0,
            at(0),
        )));
        // Queued cannot jump straight to Succeeded.
        store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Succeeded,
            100,
            at(5),
        )));

        assert_eq!(store.state().get(7).unwrap().status, JobStatus::Queued);
    }

    // -- Transitions ----------------------------------------------------------

    #[test]
    fn dispatch_reports_status_transitions() {
        let store = store();
        let t = store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Running,
            10,
            at(0),
        )));
        assert_eq!(
            t,
            vec![Transition {
                job_id: 7,
                from: None,
                to: JobStatus::Running
            }]
        );

        let t = store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Succeeded,
            100,
            at(5),
        )));
        assert_eq!(
            t,
            vec![Transition {
                job_id: 7,
                from: Some(JobStatus::Running),
                to: JobStatus::Succeeded
            }]
        );
    }

    #[test]
    fn duplicate_terminal_event_reports_no_transition() {
        let store = store();
        store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Running,
            10,
            at(0),
        )));
        store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Succeeded,
            100,
            at(5),
        )));
        // The server may repeat the terminal message; it must not re-fire.
        let t = store.dispatch(StoreAction::UpsertFromEvent(event(
            7,
            JobStatus::Succeeded,
            100,
            at(6),
        )));
        assert!(t.is_empty());
    }

    // -- ReplaceAll -----------------------------------------------------------

    #[test]
    fn replace_all_drops_stale_non_terminal_jobs() {
        let store = store();
        store.dispatch(StoreAction::AddJob(view(1, JobStatus::Running, at(0))));
        store.dispatch(StoreAction::AddJob(view(2, JobStatus::Running, at(0))));

        // Fresh snapshot only knows about job 2.
        store.dispatch(StoreAction::ReplaceAll(vec![view(
            2,
            JobStatus::Running,
            at(10),
        )]));

        let state = store.state();
        assert!(state.get(1).is_none());
        assert!(state.get(2).is_some());
    }

    #[test]
    fn replace_all_keeps_terminal_jobs_for_retention() {
        let store = store();
        store.dispatch(StoreAction::AddJob(view(1, JobStatus::Succeeded, at(0))));

        store.dispatch(StoreAction::ReplaceAll(vec![]));

        // Still visible; PruneTerminal owns its removal.
        assert_eq!(store.state().get(1).unwrap().status, JobStatus::Succeeded);
    }

    #[test]
    fn replace_all_prefers_newer_local_state() {
        let store = store();
        let mut local = view(1, JobStatus::Running, at(20));
        local.progress = 90;
        store.dispatch(StoreAction::AddJob(local));

        // Snapshot taken before the last push event.
        let mut snap = view(1, JobStatus::Running, at(15));
        snap.progress = 40;
        store.dispatch(StoreAction::ReplaceAll(vec![snap]));

        assert_eq!(store.state().get(1).unwrap().progress, 90);
    }

    // -- PruneTerminal --------------------------------------------------------

    #[test]
    fn prune_removes_failed_job_after_window() {
        let store = store();
        store.dispatch(StoreAction::AddJob(view(1, JobStatus::Failed, at(0))));

        store.dispatch(StoreAction::PruneTerminal { now: at(31) });

        assert!(store.state().get(1).is_none());
    }

    #[test]
    fn prune_keeps_failed_job_within_window() {
        let store = store();
        store.dispatch(StoreAction::AddJob(view(1, JobStatus::Failed, at(0))));

        store.dispatch(StoreAction::PruneTerminal { now: at(29) });

        assert!(store.state().get(1).is_some());
    }

    #[test]
    fn prune_removes_succeeded_job_after_short_window() {
        let store = store();
        store.dispatch(StoreAction::AddJob(view(1, JobStatus::Succeeded, at(0))));

        store.dispatch(StoreAction::PruneTerminal { now: at(6) });

        assert!(store.state().get(1).is_none());
    }

    #[test]
    fn prune_never_removes_running_jobs() {
        let store = store();
        store.dispatch(StoreAction::AddJob(view(1, JobStatus::Running, at(0))));

        // Hours later, the running job is still kept.
        store.dispatch(StoreAction::PruneTerminal { now: at(86_400) });

        assert!(store.state().get(1).is_some());
    }

    // -- Derived views and flags ----------------------------------------------

    #[test]
    fn derived_views_split_on_running() {
        let store = store();
        store.dispatch(StoreAction::AddJob(view(1, JobStatus::Running, at(0))));
        store.dispatch(StoreAction::AddJob(view(2, JobStatus::Succeeded, at(0))));
        store.dispatch(StoreAction::AddJob(view(3, JobStatus::Failed, at(0))));

        let state = store.state();
        assert_eq!(state.running().len(), 1);
        assert_eq!(state.completed().len(), 2);
    }

    #[test]
    fn outstanding_work_drives_cadence() {
        let store = store();
        assert!(!store.state().has_outstanding_work());

        store.dispatch(StoreAction::ReplaceQueued(vec![QueueEntryView {
            job_id: 5,
            batch_id: 1,
            image_ref: "app/web:1.0".into(),
            queue_position: 1,
            estimated_wait_secs: 0,
        }]));
        assert!(store.state().has_outstanding_work());

        store.dispatch(StoreAction::ReplaceQueued(vec![]));
        store.dispatch(StoreAction::AddJob(view(1, JobStatus::Running, at(0))));
        assert!(store.state().has_outstanding_work());
    }

    #[test]
    fn set_polling_flag_round_trips() {
        let store = store();
        assert!(!store.state().polling());
        store.dispatch(StoreAction::SetPolling(true));
        assert!(store.state().polling());
    }

    // -- Replay ---------------------------------------------------------------

    #[test]
    fn replaying_the_action_log_reproduces_state() {
        let store = store();
        store.dispatch(StoreAction::AddJob(view(1, JobStatus::Running, at(0))));
        store.dispatch(StoreAction::UpsertFromEvent(event(
            1,
            JobStatus::Succeeded,
            100,
            at(8),
        )));
        store.dispatch(StoreAction::UpsertFromEvent(event(
            2,
            JobStatus::Running,
            15,
            at(9),
        )));
        store.dispatch(StoreAction::PruneTerminal { now: at(30) });

        let replayed = store.replay();
        let live = store.state();

        assert_eq!(store.log_len(), 4);
        assert_eq!(replayed.len(), live.len());
        assert_eq!(
            replayed.get(2).map(|j| j.status),
            live.get(2).map(|j| j.status)
        );
        assert!(replayed.get(1).is_none());
    }
}
