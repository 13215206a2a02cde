//! Server-side batch execution pipeline.
//!
//! Fans a batch trigger out into per-target scan jobs with partial-failure
//! accounting. The pipeline consumes three capabilities — a
//! [`ScanExecutor`](executor::ScanExecutor) that performs one scan, a
//! [`Persistence`](persistence::Persistence) that owns the records, and a
//! [`ProgressFeed`](feed::ProgressFeed) that pushes updates to observers —
//! so tests can run it against in-memory fakes.

pub mod executor;
pub mod feed;
pub mod persistence;
pub mod runner;

pub use executor::{ExecutorError, ScanExecutor, ScanOutcome};
pub use feed::{NullProgressFeed, ProgressFeed, ProgressUpdate};
pub use persistence::{Persistence, PersistenceError, PgPersistence, ScheduleSpec};
pub use runner::{BatchRunner, BatchStarted};
