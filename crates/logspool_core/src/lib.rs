//! # logspool core
//!
//! A segmented, crash-tolerant local message journal. Inputs append
//! entries, processing threads read them back in order and acknowledge
//! what they have processed, and retention deletes whole segments once
//! they are over the size or age budget or fully acknowledged.
//!
//! This crate provides:
//! - Entry framing with CRC-32 checksums and a sparse offset index
//! - The segment log: rolling, cross-segment reads, crash recovery
//! - The retention engine (size, age and commit budgets)
//! - Utilization and the throttle signal for the hosting process
//! - The [`Journal`] facade and periodic [`Maintenance`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use logspool_core::{Journal, JournalConfig};
//! use std::time::Duration;
//!
//! let config = JournalConfig::new(
//!     "/var/lib/logspool/journal",
//!     100 * 1024 * 1024,
//!     Duration::from_secs(3600),
//!     5 * 1024 * 1024 * 1024,
//!     Duration::from_secs(12 * 3600),
//!     100 * 1024 * 1024,
//!     Duration::from_secs(60),
//!     90,
//! );
//! let journal = Journal::open(config)?;
//!
//! journal.write(b"message-id", b"raw message")?;
//! for entry in journal.read(100)? {
//!     // process entry.payload() ...
//!     journal.mark_journal_offset_committed(entry.offset());
//! }
//! journal.close()?;
//! # Ok::<(), logspool_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod activity;
pub mod clock;
pub mod config;
pub mod dir;
mod error;
mod journal;
pub mod lifecycle;
pub mod log;
mod maintenance;
pub mod retention;
pub mod segment;
mod stats;
pub mod throttle;
mod types;

pub use activity::{Activity, ActivityWriter, LogActivityWriter, RecordingActivityWriter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{JournalConfig, RecoveryMode};
pub use error::{CoreError, CoreResult};
pub use journal::{Journal, JournalBuilder};
pub use lifecycle::{Lifecycle, ServerStatus};
pub use maintenance::{Maintenance, MaintenanceHandle, TickOutcome};
pub use retention::{RetentionCandidate, RetentionCause, RetentionEngine, RetentionPolicy};
pub use stats::{JournalStats, StatsSnapshot};
pub use throttle::{ThrottleState, THRESHOLD_THROTTLING_DISABLED};
pub use types::{Entry, JournalState, ReadEntry, SegmentInfo};
