//! Push-feed wire message types and parser.
//!
//! The server sends JSON messages over the per-job WebSocket with the shape
//! `{"type": "<kind>", ...}`. This module deserializes them into a
//! strongly-typed [`FeedMessage`] enum and validates `progress` payloads at
//! the boundary before they become domain [`ProgressEvent`]s.

use serde::{Deserialize, Serialize};
use vigil_core::scan_job::JobStatus;
use vigil_core::types::{DbId, Timestamp};

/// Message types this client understands.
const KNOWN_TYPES: &[&str] = &["progress", "heartbeat", "connected"];

/// All known push-feed message types.
///
/// Deserialized via the internally-tagged `"type"` field; payload fields sit
/// at the top level of the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedMessage {
    /// A job progress update.
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// Liveness signal; resets the connection's heartbeat timer only.
    #[serde(rename = "heartbeat")]
    Heartbeat,

    /// Sent by the server once after the feed is established.
    #[serde(rename = "connected")]
    Connected,
}

/// Raw payload of a `progress` message, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressData {
    /// The scan job this update belongs to.
    pub request_id: DbId,
    /// Canonical identity of the scanned image (`name:tag`).
    pub scan_id: String,
    /// Wire name of the job status.
    pub status: String,
    /// Completion percentage (0-100).
    pub progress: i16,
    /// Human-readable current step, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Error message for failed scans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Server-side event time; drives staleness ordering.
    pub timestamp: Timestamp,
}

/// A validated progress update, admitted past the wire boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub job_id: DbId,
    pub scan_ref: String,
    pub status: JobStatus,
    pub progress: i16,
    pub step: Option<String>,
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

impl ProgressEvent {
    /// Validate a raw `progress` payload.
    ///
    /// Requires a positive request id, a non-empty scan identity, and a
    /// known status. Progress is clamped to `0..=100`; monotonicity is the
    /// store's job.
    pub fn from_wire(data: ProgressData) -> Result<Self, String> {
        if data.request_id <= 0 {
            return Err(format!(
                "progress message carries invalid request_id {}",
                data.request_id
            ));
        }
        if data.scan_id.trim().is_empty() {
            return Err("progress message carries an empty scan_id".to_string());
        }
        let status = JobStatus::parse(&data.status)
            .ok_or_else(|| format!("progress message carries unknown status '{}'", data.status))?;

        Ok(Self {
            job_id: data.request_id,
            scan_ref: data.scan_id,
            status,
            progress: data.progress.clamp(0, 100),
            step: data.step,
            error: data.error,
            timestamp: data.timestamp,
        })
    }
}

/// Errors from the wire boundary.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The message is not valid JSON or has a wrong shape for a known type.
    #[error("Malformed feed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The `type` field names a message kind this client does not know.
    /// Forward-compatible: callers log and ignore these.
    #[error("Unknown feed message type '{0}'")]
    UnknownType(String),
}

/// Parse a push-feed text frame into a typed message.
///
/// Distinguishes unknown `type` values (ignored, forward-compatible) from
/// genuinely malformed payloads so the router can log them differently.
pub fn parse_message(text: &str) -> Result<FeedMessage, ParseError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string();

    match serde_json::from_value::<FeedMessage>(value) {
        Ok(msg) => Ok(msg),
        Err(_) if !KNOWN_TYPES.contains(&kind.as_str()) => Err(ParseError::UnknownType(kind)),
        Err(e) => Err(ParseError::Malformed(e)),
    }
}
