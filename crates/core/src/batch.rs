//! Batch status model, counter rules, and target selection.
//!
//! A batch fans one trigger out into one scan job per resolved target. Its
//! terminal status is a pure function of the final counters, so the pipeline
//! never has to guess from job rows.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::scan_job::StatusId;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Batch status
// ---------------------------------------------------------------------------

/// Batch execution status.
///
/// Variant discriminants match the 1-based seed data in the `batch_statuses`
/// database table.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Batch row created, no job started yet.
    Pending = 1,
    /// At least one job has started.
    Running = 2,
    /// Every target succeeded.
    Completed = 3,
    /// Some targets succeeded, some failed.
    Partial = 4,
    /// Every target failed, or the pipeline itself faulted.
    Failed = 5,
}

impl BatchStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Look up a status from its database ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Pending),
            2 => Some(Self::Running),
            3 => Some(Self::Completed),
            4 => Some(Self::Partial),
            5 => Some(Self::Failed),
            _ => None,
        }
    }

    /// Wire/display name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    /// Whether this status permits no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Counter rules
// ---------------------------------------------------------------------------

/// Validate the standing counter invariant.
///
/// `completed + failed` may never exceed `total`, and nothing may be
/// negative.
pub fn check_counters(total: i32, completed: i32, failed: i32) -> Result<(), CoreError> {
    if total < 0 || completed < 0 || failed < 0 {
        return Err(CoreError::Internal(format!(
            "Negative batch counter: total={total} completed={completed} failed={failed}"
        )));
    }
    if completed + failed > total {
        return Err(CoreError::Internal(format!(
            "Batch counters exceed total: {completed} + {failed} > {total}"
        )));
    }
    Ok(())
}

/// Compute the terminal status of a batch from its final counters.
///
/// - `Failed` iff every target failed.
/// - `Partial` iff some but not all targets failed.
/// - `Completed` iff no target failed.
pub fn finalize_status(total: i32, failed: i32) -> BatchStatus {
    if failed == total {
        BatchStatus::Failed
    } else if failed > 0 {
        BatchStatus::Partial
    } else {
        BatchStatus::Completed
    }
}

// ---------------------------------------------------------------------------
// Target selection
// ---------------------------------------------------------------------------

/// How a schedule picks which images to scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// The explicit configured target list.
    Specific,
    /// Every inventory image whose `name:tag` matches a configured regex.
    Pattern,
    /// Every image known to the inventory.
    All,
}

impl SelectionMode {
    /// Parse the database representation of a selection mode.
    ///
    /// Unknown values map to `NotImplemented` so a new mode added to the
    /// schema before the code never silently produces an empty batch.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "specific" => Ok(Self::Specific),
            "pattern" => Ok(Self::Pattern),
            "all" => Ok(Self::All),
            other => Err(CoreError::NotImplemented(format!(
                "Selection mode '{other}' is not implemented"
            ))),
        }
    }

    /// Database/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Specific => "specific",
            Self::Pattern => "pattern",
            Self::All => "all",
        }
    }
}

/// One scannable image from the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTarget {
    pub id: DbId,
    pub name: String,
    pub tag: String,
}

impl ImageTarget {
    /// Canonical identity used for pattern matching and display.
    pub fn canonical_ref(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

/// Resolve a schedule's target set against the image inventory.
///
/// An invalid `pattern` regex is a configuration error returned to the
/// caller, never treated as match-nothing or match-everything. Zero matches
/// are returned as an empty vec; rejecting an empty batch is the pipeline's
/// call because it owns the error message.
pub fn resolve_targets(
    mode: SelectionMode,
    configured_ids: &[DbId],
    pattern: Option<&str>,
    inventory: &[ImageTarget],
) -> Result<Vec<ImageTarget>, CoreError> {
    match mode {
        SelectionMode::Specific => {
            let mut targets = Vec::with_capacity(configured_ids.len());
            let mut missing = Vec::new();
            for id in configured_ids {
                match inventory.iter().find(|t| t.id == *id) {
                    Some(target) => targets.push(target.clone()),
                    None => missing.push(id.to_string()),
                }
            }
            if !missing.is_empty() {
                return Err(CoreError::Validation(format!(
                    "Configured target image(s) not in inventory: {}",
                    missing.join(", ")
                )));
            }
            Ok(targets)
        }

        SelectionMode::Pattern => {
            let pattern = pattern.ok_or_else(|| {
                CoreError::Validation("Pattern selection mode requires a pattern".to_string())
            })?;
            let regex = Regex::new(pattern).map_err(|e| {
                CoreError::Validation(format!("Invalid target pattern '{pattern}': {e}"))
            })?;
            Ok(inventory
                .iter()
                .filter(|t| regex.is_match(&t.canonical_ref()))
                .cloned()
                .collect())
        }

        SelectionMode::All => Ok(inventory.to_vec()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
