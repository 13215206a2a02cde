//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` DTOs for inserts and queries where the API needs them

pub mod batch;
pub mod image;
pub mod scan_job;
pub mod schedule;
