//! Request handlers.
//!
//! Each submodule provides async handler functions for one resource.
//! Handlers delegate to the repositories in `vigil_db` (or the batch
//! runner) and map errors via [`crate::error::AppError`].

pub mod scans;
pub mod schedules;
