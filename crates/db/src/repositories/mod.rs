//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod batch_repo;
pub mod image_repo;
pub mod scan_job_repo;
pub mod schedule_repo;

pub use batch_repo::BatchRepo;
pub use image_repo::ImageRepo;
pub use scan_job_repo::ScanJobRepo;
pub use schedule_repo::ScheduleRepo;
