//! Scan schedule entity model.

use serde::Serialize;
use sqlx::FromRow;
use vigil_core::types::{DbId, Timestamp};

/// A row from the `scan_schedules` table.
///
/// `selection_mode` holds the database string for
/// [`vigil_core::batch::SelectionMode`]; `target_ids` is a JSONB array of
/// image ids used by the `specific` mode.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ScanSchedule {
    pub id: DbId,
    pub name: String,
    pub selection_mode: String,
    pub target_ids: serde_json::Value,
    pub pattern: Option<String>,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ScanSchedule {
    /// Decode the JSONB target id array.
    ///
    /// Non-array or non-integer content is treated as an empty list; the
    /// pipeline rejects empty target sets with its own error.
    pub fn configured_target_ids(&self) -> Vec<DbId> {
        self.target_ids
            .as_array()
            .map(|ids| ids.iter().filter_map(|v| v.as_i64()).collect())
            .unwrap_or_default()
    }
}
