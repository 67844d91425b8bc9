//! Journal configuration.

use crate::error::{CoreError, CoreResult};
use crate::throttle::THRESHOLD_THROTTLING_DISABLED;
use std::path::PathBuf;
use std::time::Duration;

/// Default distance, in bytes of appended data, between offset index entries.
pub const DEFAULT_INDEX_INTERVAL_BYTES: u64 = 4096;

/// Default period of the scheduled retention pass.
pub const DEFAULT_RETENTION_INTERVAL: Duration = Duration::from_secs(60);

/// What to do with a segment that fails structural validation at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    /// Refuse to open the journal.
    #[default]
    FailFast,
    /// Cut the damaged segment back to its last well-formed record and
    /// continue. Offsets after the damage are lost and readers skip the gap.
    BestEffort,
}

/// Configuration for opening a journal.
///
/// The eight construction parameters are required; see [`JournalConfig::new`].
/// The remaining knobs have defaults and builder setters.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Journal root directory (holds the lock file and the segment log).
    pub directory: PathBuf,

    /// Maximum size of one segment's data file before rolling.
    pub max_segment_size: u64,

    /// Age after which a non-empty active segment is rolled.
    pub max_segment_age: Duration,

    /// Size budget for the whole journal.
    pub max_total_size: u64,

    /// Age after which a closed segment is removed by retention.
    pub max_total_age: Duration,

    /// Largest framed entry accepted; bigger entries are dropped.
    pub max_message_size: u64,

    /// How often dirty segments are synced to disk.
    pub flush_interval: Duration,

    /// Utilization percentage above which the process is throttled.
    /// [`THRESHOLD_THROTTLING_DISABLED`] turns throttling off.
    pub throttle_threshold_percent: u32,

    /// How often the scheduled retention pass runs.
    pub retention_interval: Duration,

    /// Policy for structurally damaged segments found at open.
    pub recovery_mode: RecoveryMode,

    /// Bytes of appended data between two offset index entries.
    pub index_interval_bytes: u64,
}

impl JournalConfig {
    /// Creates a configuration from the required journal parameters.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        directory: impl Into<PathBuf>,
        max_segment_size: u64,
        max_segment_age: Duration,
        max_total_size: u64,
        max_total_age: Duration,
        max_message_size: u64,
        flush_interval: Duration,
        throttle_threshold_percent: u32,
    ) -> Self {
        Self {
            directory: directory.into(),
            max_segment_size,
            max_segment_age,
            max_total_size,
            max_total_age,
            max_message_size,
            flush_interval,
            throttle_threshold_percent,
            retention_interval: DEFAULT_RETENTION_INTERVAL,
            recovery_mode: RecoveryMode::FailFast,
            index_interval_bytes: DEFAULT_INDEX_INTERVAL_BYTES,
        }
    }

    /// Sets how often the scheduled retention pass runs.
    #[must_use]
    pub const fn retention_interval(mut self, interval: Duration) -> Self {
        self.retention_interval = interval;
        self
    }

    /// Sets the policy for damaged segments found at open.
    #[must_use]
    pub const fn recovery_mode(mut self, mode: RecoveryMode) -> Self {
        self.recovery_mode = mode;
        self
    }

    /// Sets the offset index density.
    #[must_use]
    pub const fn index_interval_bytes(mut self, bytes: u64) -> Self {
        self.index_interval_bytes = bytes;
        self
    }

    /// Returns whether throttling is switched off.
    #[must_use]
    pub const fn throttling_disabled(&self) -> bool {
        self.throttle_threshold_percent == THRESHOLD_THROTTLING_DISABLED
    }

    /// Largest framed entry the journal will store.
    #[must_use]
    pub fn max_entry_size(&self) -> u64 {
        self.max_segment_size.min(self.max_message_size)
    }

    /// Checks the configuration for values the journal cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] naming the offending setting.
    pub fn validate(&self) -> CoreResult<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(CoreError::invalid_config("journal directory is empty"));
        }
        if self.max_segment_size == 0 {
            return Err(CoreError::invalid_config("max_segment_size must be positive"));
        }
        if self.max_segment_size > u64::from(u32::MAX) {
            return Err(CoreError::invalid_config(
                "max_segment_size must fit in 32 bits",
            ));
        }
        if self.max_total_size == 0 {
            return Err(CoreError::invalid_config("max_total_size must be positive"));
        }
        if self.max_message_size == 0 {
            return Err(CoreError::invalid_config("max_message_size must be positive"));
        }
        if self.max_segment_age.is_zero() || self.max_total_age.is_zero() {
            return Err(CoreError::invalid_config("segment and journal ages must be positive"));
        }
        if self.flush_interval.is_zero() || self.retention_interval.is_zero() {
            return Err(CoreError::invalid_config("flush and retention intervals must be positive"));
        }
        if self.throttle_threshold_percent > 100 {
            return Err(CoreError::invalid_config(format!(
                "throttle threshold {}% is above 100%",
                self.throttle_threshold_percent
            )));
        }
        if self.index_interval_bytes == 0 {
            return Err(CoreError::invalid_config("index_interval_bytes must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> JournalConfig {
        JournalConfig::new(
            "/tmp/journal",
            1024,
            Duration::from_secs(3600),
            10 * 1024,
            Duration::from_secs(86_400),
            1_000_000,
            Duration::from_secs(60),
            90,
        )
    }

    #[test]
    fn new_applies_defaults_for_extras() {
        let config = sample();
        assert_eq!(config.retention_interval, DEFAULT_RETENTION_INTERVAL);
        assert_eq!(config.recovery_mode, RecoveryMode::FailFast);
        assert_eq!(config.index_interval_bytes, DEFAULT_INDEX_INTERVAL_BYTES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = sample()
            .retention_interval(Duration::from_secs(5))
            .recovery_mode(RecoveryMode::BestEffort)
            .index_interval_bytes(128);

        assert_eq!(config.retention_interval, Duration::from_secs(5));
        assert_eq!(config.recovery_mode, RecoveryMode::BestEffort);
        assert_eq!(config.index_interval_bytes, 128);
    }

    #[test]
    fn max_entry_size_is_smaller_limit() {
        let config = sample();
        assert_eq!(config.max_entry_size(), 1024);

        let mut small_messages = sample();
        small_messages.max_message_size = 100;
        assert_eq!(small_messages.max_entry_size(), 100);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = sample();
        config.max_segment_size = 0;
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfig { .. })
        ));

        let mut config = sample();
        config.throttle_threshold_percent = 101;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.flush_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_threshold_disables_throttling() {
        let mut config = sample();
        assert!(!config.throttling_disabled());
        config.throttle_threshold_percent = THRESHOLD_THROTTLING_DISABLED;
        assert!(config.throttling_disabled());
    }
}
