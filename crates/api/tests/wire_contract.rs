//! Wire-contract tests between the server's feed payloads and the
//! observer-side parser in `vigil-feed`.
//!
//! The push protocol is JSON over WebSocket with no shared types between
//! the two sides, so these tests pin the contract: everything the server
//! emits must be admitted by the client's boundary validation.

use axum::extract::ws::Message;
use chrono::Utc;
use vigil_api::ws::{connected_payload, heartbeat_payload, progress_payload, WsManager};
use vigil_core::scan_job::JobStatus;
use vigil_feed::messages::{parse_message, FeedMessage, ProgressEvent};
use vigil_feed::router::Routed;
use vigil_feed::EventRouter;
use vigil_pipeline::{ProgressFeed, ProgressUpdate};

#[test]
fn progress_payload_parses_on_the_observer_side() {
    let update = ProgressUpdate {
        job_id: 42,
        image_ref: "registry.local/app/web:1.4.2".into(),
        status: JobStatus::Running,
        progress: 55,
        step: Some("os packages".into()),
        error: None,
        timestamp: Utc::now(),
    };

    let wire = progress_payload(&update).to_string();
    let parsed = parse_message(&wire).expect("server payload must parse");

    let data = match parsed {
        FeedMessage::Progress(data) => data,
        other => panic!("Expected Progress, got {other:?}"),
    };
    let event = ProgressEvent::from_wire(data).expect("server payload must validate");

    assert_eq!(event.job_id, 42);
    assert_eq!(event.scan_ref, "registry.local/app/web:1.4.2");
    assert_eq!(event.status, JobStatus::Running);
    assert_eq!(event.progress, 55);
    assert_eq!(event.step.as_deref(), Some("os packages"));
}

#[test]
fn terminal_payload_with_error_parses() {
    let update = ProgressUpdate {
        job_id: 9,
        image_ref: "registry.local/app/worker:2.0".into(),
        status: JobStatus::Failed,
        progress: 30,
        step: None,
        error: Some("manifest pull failed".into()),
        timestamp: Utc::now(),
    };

    let wire = progress_payload(&update).to_string();
    let parsed = parse_message(&wire).unwrap();
    let data = match parsed {
        FeedMessage::Progress(data) => data,
        other => panic!("Expected Progress, got {other:?}"),
    };
    let event = ProgressEvent::from_wire(data).unwrap();

    assert_eq!(event.status, JobStatus::Failed);
    assert_eq!(event.error.as_deref(), Some("manifest pull failed"));
}

#[test]
fn handshake_and_heartbeat_payloads_parse() {
    let connected = parse_message(&connected_payload().to_string()).unwrap();
    assert!(matches!(connected, FeedMessage::Connected));

    let heartbeat = parse_message(&heartbeat_payload().to_string()).unwrap();
    assert!(matches!(heartbeat, FeedMessage::Heartbeat));
}

#[test]
fn heartbeat_payload_routes_as_heartbeat() {
    let router = EventRouter::new();
    let verdict = router.route(7, &heartbeat_payload().to_string());
    assert_eq!(verdict, Routed::Heartbeat);
}

// ---------------------------------------------------------------------------
// Test: publish() delivers the wire message to that job's observers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_reaches_job_observers_with_valid_wire_shape() {
    let manager = WsManager::new();
    let mut rx = manager.add("conn-1".to_string(), 42).await;

    manager
        .publish(ProgressUpdate::now(
            42,
            "registry.local/app/web:1.4.2",
            JobStatus::Succeeded,
            100,
        ))
        .await;

    let msg = rx.recv().await.expect("observer should receive publish");
    let text = match msg {
        Message::Text(text) => text.to_string(),
        other => panic!("Expected Text frame, got {other:?}"),
    };

    let parsed = parse_message(&text).unwrap();
    let data = match parsed {
        FeedMessage::Progress(data) => data,
        other => panic!("Expected Progress, got {other:?}"),
    };
    let event = ProgressEvent::from_wire(data).unwrap();
    assert_eq!(event.status, JobStatus::Succeeded);
    assert_eq!(event.progress, 100);
}
