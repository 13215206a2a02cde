//! Inbound message routing and subscriber dispatch.
//!
//! The router sits between the raw connection read loop and application
//! code: it parses each frame, validates `progress` payloads at the
//! boundary, and fans valid events out to registered listeners in
//! registration order. Invalid or unknown messages are dropped with a
//! diagnostic; they never crash the router.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::RwLock;

use vigil_core::types::DbId;

use crate::manager::ConnectionStatus;
use crate::messages::{parse_message, FeedMessage, ParseError, ProgressEvent};

type ProgressListener = Box<dyn Fn(&ProgressEvent) + Send + Sync>;
type StatusListener = Box<dyn Fn(DbId, ConnectionStatus) + Send + Sync>;
type ErrorListener = Box<dyn Fn(DbId, &str) + Send + Sync>;

/// What the router did with one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// A validated progress event was dispatched to subscribers.
    Progress,
    /// Liveness signal; the caller should reset its heartbeat deadline.
    /// Never forwarded to application subscribers.
    Heartbeat,
    /// Server handshake acknowledgement.
    Connected,
    /// Unknown type or invalid payload; logged and ignored.
    Dropped,
}

/// Dispatches typed feed events to registered listeners.
///
/// An explicit injected instance with no global state, so tests can build
/// isolated routers. Listeners run in registration order; one listener
/// panicking must not starve the rest, so each invocation is isolated.
pub struct EventRouter {
    progress_listeners: RwLock<Vec<ProgressListener>>,
    status_listeners: RwLock<Vec<StatusListener>>,
    error_listeners: RwLock<Vec<ErrorListener>>,
}

impl EventRouter {
    /// Create a router with no listeners.
    pub fn new() -> Self {
        Self {
            progress_listeners: RwLock::new(Vec::new()),
            status_listeners: RwLock::new(Vec::new()),
            error_listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener for validated progress events.
    pub fn on_progress(&self, listener: impl Fn(&ProgressEvent) + Send + Sync + 'static) {
        self.progress_listeners
            .write()
            .expect("progress listener lock poisoned")
            .push(Box::new(listener));
    }

    /// Register a listener for connection status changes.
    pub fn on_status_change(
        &self,
        listener: impl Fn(DbId, ConnectionStatus) + Send + Sync + 'static,
    ) {
        self.status_listeners
            .write()
            .expect("status listener lock poisoned")
            .push(Box::new(listener));
    }

    /// Register a listener for transport-level errors.
    pub fn on_error(&self, listener: impl Fn(DbId, &str) + Send + Sync + 'static) {
        self.error_listeners
            .write()
            .expect("error listener lock poisoned")
            .push(Box::new(listener));
    }

    /// Route one inbound text frame from a job's connection.
    pub fn route(&self, job_id: DbId, raw: &str) -> Routed {
        match parse_message(raw) {
            Ok(FeedMessage::Heartbeat) => Routed::Heartbeat,
            Ok(FeedMessage::Connected) => Routed::Connected,
            Ok(FeedMessage::Progress(data)) => match ProgressEvent::from_wire(data) {
                Ok(event) => {
                    self.dispatch_progress(&event);
                    Routed::Progress
                }
                Err(reason) => {
                    tracing::warn!(job_id, reason = %reason, "Dropping invalid progress message");
                    Routed::Dropped
                }
            },
            Err(ParseError::UnknownType(kind)) => {
                tracing::debug!(job_id, kind = %kind, "Ignoring unknown feed message type");
                Routed::Dropped
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, raw_message = %raw, "Dropping malformed feed message");
                Routed::Dropped
            }
        }
    }

    /// Notify status-change listeners of a connection transition.
    pub fn notify_status(&self, job_id: DbId, status: ConnectionStatus) {
        let listeners = self
            .status_listeners
            .read()
            .expect("status listener lock poisoned");
        for listener in listeners.iter() {
            if catch_unwind(AssertUnwindSafe(|| listener(job_id, status))).is_err() {
                tracing::error!(job_id, "Status listener panicked");
            }
        }
    }

    /// Notify error listeners of a transport failure.
    pub fn notify_error(&self, job_id: DbId, message: &str) {
        let listeners = self
            .error_listeners
            .read()
            .expect("error listener lock poisoned");
        for listener in listeners.iter() {
            if catch_unwind(AssertUnwindSafe(|| listener(job_id, message))).is_err() {
                tracing::error!(job_id, "Error listener panicked");
            }
        }
    }

    fn dispatch_progress(&self, event: &ProgressEvent) {
        let listeners = self
            .progress_listeners
            .read()
            .expect("progress listener lock poisoned");
        for listener in listeners.iter() {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(job_id = event.job_id, "Progress listener panicked");
            }
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}
