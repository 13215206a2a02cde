//! Queue wait estimation for queued scan jobs.

/// Average wall-clock seconds one image scan takes.
///
/// Used to estimate waits for queued jobs until real per-image timing data
/// exists to average over.
pub const DEFAULT_AVG_SCAN_SECS: i32 = 90;

/// Estimate how long a queued job will wait before starting.
///
/// `queue_position` is 1-based; the job at position 1 runs next and waits
/// zero seconds.
pub fn estimate_wait_secs(queue_position: i32, avg_scan_secs: i32) -> i32 {
    (queue_position.max(1) - 1).saturating_mul(avg_scan_secs.max(0))
}
