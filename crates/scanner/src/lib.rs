//! Bridge to the external scan engine.
//!
//! The engine does the actual image inspection; this crate submits scans
//! over its HTTP API, follows progress over its WebSocket (reconnecting
//! with backoff when it drops), and republishes everything as
//! [`events::ScanEvent`]s on a broadcast channel. [`executor::EngineExecutor`]
//! adapts the bridge to the pipeline's `ScanExecutor` capability.

pub mod api;
pub mod client;
pub mod events;
pub mod executor;
pub mod manager;
pub mod messages;
pub mod reconnect;

pub use events::ScanEvent;
pub use executor::EngineExecutor;
pub use manager::{EngineConfig, ScanEngineManager};
