//! Journal utilization and the throttle signal.

use crate::lifecycle::ServerStatus;
use std::sync::Arc;

/// Threshold value that switches throttling off.
pub const THRESHOLD_THROTTLING_DISABLED: u32 = 0;

/// Fraction of the size budget in use, clamped to `[0, 1]`.
#[must_use]
pub fn utilization(size: u64, max_total_size: u64) -> f64 {
    if max_total_size == 0 {
        return 1.0;
    }
    (size as f64 / max_total_size as f64).clamp(0.0, 1.0)
}

/// Returns whether `utilization` is above `threshold_percent`.
///
/// Always `false` when throttling is disabled.
#[must_use]
pub fn exceeds_threshold(utilization: f64, threshold_percent: u32) -> bool {
    threshold_percent != THRESHOLD_THROTTLING_DISABLED
        && utilization * 100.0 > f64::from(threshold_percent)
}

/// Applies the utilization level to the server lifecycle.
///
/// Level-triggered: every evaluation re-asserts the state the current
/// utilization calls for.
#[derive(Debug, Clone)]
pub struct ThrottleMonitor {
    threshold_percent: u32,
    status: Arc<ServerStatus>,
}

impl ThrottleMonitor {
    /// Creates a monitor moving `status` at `threshold_percent`.
    #[must_use]
    pub fn new(threshold_percent: u32, status: Arc<ServerStatus>) -> Self {
        Self {
            threshold_percent,
            status,
        }
    }

    /// The lifecycle status this monitor drives.
    #[must_use]
    pub fn status(&self) -> &Arc<ServerStatus> {
        &self.status
    }

    /// Throttles or unthrottles according to `utilization`.
    ///
    /// Returns whether the journal is over its threshold.
    pub fn evaluate(&self, utilization: f64) -> bool {
        let over = exceeds_threshold(utilization, self.threshold_percent);
        if over {
            if self.status.throttle() {
                tracing::info!(
                    utilization_percent = utilization * 100.0,
                    threshold_percent = self.threshold_percent,
                    "journal utilization above threshold, throttling"
                );
            }
        } else if self.status.unthrottle() {
            tracing::info!(
                utilization_percent = utilization * 100.0,
                threshold_percent = self.threshold_percent,
                "journal utilization back below threshold, unthrottling"
            );
        }
        over
    }
}

/// Point-in-time view of the journal for throttling decisions and
/// monitoring.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleState {
    /// Entries written but not yet committed.
    pub uncommitted_entries: u64,
    /// Bytes on disk across all segments.
    pub journal_size: u64,
    /// Configured size budget.
    pub journal_size_limit: u64,
    /// `journal_size / journal_size_limit`, clamped to `[0, 1]`.
    pub utilization: f64,
    /// Oldest offset still stored.
    pub log_start_offset: u64,
    /// Offset the next write will receive.
    pub log_end_offset: u64,
    /// Offset the next cursor read starts at.
    pub next_read_offset: u64,
    /// Highest committed offset, if any.
    pub committed_offset: Option<u64>,
    /// Number of segments.
    pub segment_count: usize,
}

/// Counts entries in `[start, end)` above the committed offset.
#[must_use]
pub fn uncommitted_entries(log_start: u64, log_end: u64, committed: Option<u64>) -> u64 {
    let first_uncommitted = committed.map_or(log_start, |c| c.saturating_add(1).max(log_start));
    log_end.saturating_sub(first_uncommitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;

    #[test]
    fn utilization_is_clamped() {
        assert_eq!(utilization(0, 100), 0.0);
        assert!((utilization(50, 200) - 0.25).abs() < f64::EPSILON);
        assert_eq!(utilization(500, 100), 1.0);
    }

    #[test]
    fn threshold_comparison() {
        assert!(exceeds_threshold(0.95, 90));
        assert!(!exceeds_threshold(0.90, 90));
        assert!(!exceeds_threshold(1.0, THRESHOLD_THROTTLING_DISABLED));
    }

    #[test]
    fn monitor_moves_lifecycle() {
        let status = Arc::new(ServerStatus::with_lifecycle(Lifecycle::Running));
        let monitor = ThrottleMonitor::new(90, Arc::clone(&status));

        assert!(!monitor.evaluate(0.5));
        assert_eq!(status.lifecycle(), Lifecycle::Running);

        assert!(monitor.evaluate(0.95));
        assert_eq!(status.lifecycle(), Lifecycle::Throttled);

        assert!(monitor.evaluate(0.99));
        assert_eq!(status.lifecycle(), Lifecycle::Throttled);

        assert!(!monitor.evaluate(0.2));
        assert_eq!(status.lifecycle(), Lifecycle::Running);
    }

    #[test]
    fn disabled_monitor_never_throttles() {
        let status = Arc::new(ServerStatus::with_lifecycle(Lifecycle::Running));
        let monitor = ThrottleMonitor::new(THRESHOLD_THROTTLING_DISABLED, Arc::clone(&status));
        assert!(!monitor.evaluate(1.0));
        assert_eq!(status.lifecycle(), Lifecycle::Running);
    }

    #[test]
    fn uncommitted_counts() {
        assert_eq!(uncommitted_entries(0, 10, None), 10);
        assert_eq!(uncommitted_entries(0, 10, Some(3)), 6);
        assert_eq!(uncommitted_entries(5, 10, Some(1)), 5);
        assert_eq!(uncommitted_entries(0, 10, Some(20)), 0);
    }
}
