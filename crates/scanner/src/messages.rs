//! Scan engine WebSocket message types and parser.
//!
//! The engine sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes them into
//! a strongly-typed [`EngineMessage`] enum.

use serde::Deserialize;

/// All known engine WebSocket message types.
///
/// Deserialized via the internally-tagged `"type"` field with associated
/// `"data"` content.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineMessage {
    /// The engine accepted a scan and began working on it.
    #[serde(rename = "scan_started")]
    ScanStarted(ScanStartedData),

    /// Step-level progress for a running scan.
    #[serde(rename = "scan_progress")]
    ScanProgress(ScanProgressData),

    /// A scan finished and produced a findings summary.
    #[serde(rename = "scan_completed")]
    ScanCompleted(ScanCompletedData),

    /// A scan failed with an error.
    #[serde(rename = "scan_failed")]
    ScanFailed(ScanFailedData),

    /// A scan was cancelled on the engine side.
    #[serde(rename = "scan_cancelled")]
    ScanCancelled(ScanCancelledData),

    /// Engine queue depth broadcast.
    #[serde(rename = "queue_status")]
    QueueStatus(QueueStatusData),
}

/// Payload for `scan_started` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanStartedData {
    pub scan_id: String,
}

/// Payload for `scan_progress` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanProgressData {
    pub scan_id: String,
    /// Completion percentage (0-100).
    pub percent: i16,
    /// The analysis phase currently running, if reported.
    #[serde(default)]
    pub step: Option<String>,
}

/// Payload for `scan_completed` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanCompletedData {
    pub scan_id: String,
    /// Findings digest (severity counts, advisory ids, etc.).
    pub summary: serde_json::Value,
}

/// Payload for `scan_failed` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanFailedData {
    pub scan_id: String,
    pub error: String,
}

/// Payload for `scan_cancelled` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanCancelledData {
    pub scan_id: String,
}

/// Payload for `queue_status` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatusData {
    pub queue_remaining: i32,
}

/// Parse an engine WebSocket text message into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values. Callers
/// should log unknown types and continue.
pub fn parse_message(text: &str) -> Result<EngineMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scan_started_message() {
        let json = r#"{"type":"scan_started","data":{"scan_id":"scan-abc"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            EngineMessage::ScanStarted(data) => assert_eq!(data.scan_id, "scan-abc"),
            other => panic!("Expected ScanStarted, got {other:?}"),
        }
    }

    #[test]
    fn parse_scan_progress_message() {
        let json =
            r#"{"type":"scan_progress","data":{"scan_id":"scan-abc","percent":42,"step":"os packages"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            EngineMessage::ScanProgress(data) => {
                assert_eq!(data.scan_id, "scan-abc");
                assert_eq!(data.percent, 42);
                assert_eq!(data.step.as_deref(), Some("os packages"));
            }
            other => panic!("Expected ScanProgress, got {other:?}"),
        }
    }

    #[test]
    fn parse_scan_progress_without_step() {
        let json = r#"{"type":"scan_progress","data":{"scan_id":"scan-abc","percent":10}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            EngineMessage::ScanProgress(data) => assert!(data.step.is_none()),
            other => panic!("Expected ScanProgress, got {other:?}"),
        }
    }

    #[test]
    fn parse_scan_completed_message() {
        let json = r#"{"type":"scan_completed","data":{"scan_id":"scan-abc","summary":{"critical":1,"high":4}}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            EngineMessage::ScanCompleted(data) => {
                assert_eq!(data.scan_id, "scan-abc");
                assert_eq!(data.summary["critical"], 1);
            }
            other => panic!("Expected ScanCompleted, got {other:?}"),
        }
    }

    #[test]
    fn parse_scan_failed_message() {
        let json = r#"{"type":"scan_failed","data":{"scan_id":"scan-abc","error":"manifest pull failed"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            EngineMessage::ScanFailed(data) => {
                assert_eq!(data.error, "manifest pull failed");
            }
            other => panic!("Expected ScanFailed, got {other:?}"),
        }
    }

    #[test]
    fn parse_queue_status_message() {
        let json = r#"{"type":"queue_status","data":{"queue_remaining":3}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            EngineMessage::QueueStatus(data) => assert_eq!(data.queue_remaining, 3),
            other => panic!("Expected QueueStatus, got {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_type_returns_error() {
        let json = r#"{"type":"telemetry","data":{}}"#;
        assert!(parse_message(json).is_err());
    }

    #[test]
    fn parse_invalid_json_returns_error() {
        assert!(parse_message("not json at all").is_err());
    }
}
