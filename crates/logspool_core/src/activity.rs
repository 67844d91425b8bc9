//! Operational activity records.
//!
//! The journal reports housekeeping that operators care about (currently
//! segment removal by retention) as [`Activity`] records handed to an
//! [`ActivityWriter`]. Emitting them is not part of the storage contract.

use crate::retention::RetentionCandidate;
use parking_lot::Mutex;

/// One activity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    /// Human-readable summary.
    pub message: String,
    /// Component that produced the record.
    pub source: &'static str,
    /// Segments removed, oldest first.
    pub removed: Vec<RetentionCandidate>,
}

impl Activity {
    /// Builds the record for a retention pass that removed `removed`.
    #[must_use]
    pub fn segments_removed(removed: Vec<RetentionCandidate>) -> Self {
        let offsets = removed
            .iter()
            .map(|c| c.base_offset.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            message: format!(
                "Removed {} journal segment(s) by retention: [{offsets}]",
                removed.len()
            ),
            source: "logspool_core::journal",
            removed,
        }
    }
}

/// Receives activity records.
pub trait ActivityWriter: Send + Sync + std::fmt::Debug {
    /// Records one activity.
    fn write(&self, activity: &Activity);
}

/// Writes activities to the `tracing` log at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogActivityWriter;

impl ActivityWriter for LogActivityWriter {
    fn write(&self, activity: &Activity) {
        tracing::info!(source = activity.source, "{}", activity.message);
    }
}

/// Keeps activities in memory for later inspection.
#[derive(Debug, Default)]
pub struct RecordingActivityWriter {
    activities: Mutex<Vec<Activity>>,
}

impl RecordingActivityWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every activity written so far.
    #[must_use]
    pub fn activities(&self) -> Vec<Activity> {
        self.activities.lock().clone()
    }
}

impl ActivityWriter for RecordingActivityWriter {
    fn write(&self, activity: &Activity) {
        self.activities.lock().push(activity.clone());
    }
}
