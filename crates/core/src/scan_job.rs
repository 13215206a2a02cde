//! Scan job status enum and lifecycle state machine.
//!
//! This module lives in `core` (zero internal deps) so it can be used by both
//! the repository layer and the observer feed without pulling in sqlx.

use serde::{Deserialize, Serialize};

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

/// Scan job execution status.
///
/// Variant discriminants match the 1-based seed data in the `job_statuses`
/// database table.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for a pipeline slot.
    Queued = 1,
    /// The scan engine is working on the image.
    Running = 2,
    /// Scan finished and findings were recorded.
    Succeeded = 3,
    /// Scan failed with an error.
    Failed = 4,
    /// Scan was cancelled before completion.
    Cancelled = 5,
}

impl JobStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Look up a status from its database ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Queued),
            2 => Some(Self::Running),
            3 => Some(Self::Succeeded),
            4 => Some(Self::Failed),
            5 => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Wire/display name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse a wire/display name back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether this status permits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl From<JobStatus> for StatusId {
    fn from(value: JobStatus) -> Self {
        value as StatusId
    }
}

/// Forward-only lifecycle state machine for scan jobs.
pub mod state_machine {
    use super::JobStatus;

    /// Returns the set of valid target statuses reachable from `from`.
    ///
    /// Terminal states return an empty slice because no further transitions
    /// are allowed.
    pub fn valid_transitions(from: JobStatus) -> &'static [JobStatus] {
        match from {
            // Queued -> Running, Cancelled
            JobStatus::Queued => &[JobStatus::Running, JobStatus::Cancelled],
            // Running -> Succeeded, Failed, Cancelled
            JobStatus::Running => &[
                JobStatus::Succeeded,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ],
            // Terminal states: Succeeded, Failed, Cancelled
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning an error message for invalid ones.
    pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!(
                "Invalid transition: {} -> {}",
                from.as_str(),
                to.as_str()
            ))
        }
    }
}

/// Merge an incoming progress percentage into the current one.
///
/// Progress is clamped to `0..=100` and never moves backwards while a job is
/// running.
pub fn merge_progress(current: i16, incoming: i16) -> i16 {
    incoming.clamp(0, 100).max(current)
}
