//! Process lifecycle signal.
//!
//! The journal does not slow ingestion itself. It reports storage pressure
//! by moving the hosting process's [`ServerStatus`] between
//! [`Lifecycle::Running`] and [`Lifecycle::Throttled`]; inputs watch the
//! status and back off.

use parking_lot::Mutex;
use std::fmt;

/// Lifecycle states of the hosting process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifecycle {
    /// Not started yet.
    #[default]
    Uninitialized,
    /// Starting up.
    Starting,
    /// Processing normally.
    Running,
    /// Processing, but inputs should slow down.
    Throttled,
    /// Processing paused by an operator.
    Paused,
    /// Shutting down.
    Halting,
    /// Startup or processing failed.
    Failed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Throttled => "THROTTLED",
            Self::Paused => "PAUSED",
            Self::Halting => "HALTING",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Shared lifecycle status of the hosting process.
///
/// Usually held in an `Arc` by every component that needs to read or move
/// the lifecycle.
#[derive(Debug, Default)]
pub struct ServerStatus {
    lifecycle: Mutex<Lifecycle>,
}

impl ServerStatus {
    /// Creates a status in [`Lifecycle::Uninitialized`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a status already in `lifecycle`.
    #[must_use]
    pub fn with_lifecycle(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle: Mutex::new(lifecycle),
        }
    }

    /// Returns the current lifecycle.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    /// Sets the lifecycle unconditionally.
    pub fn set_lifecycle(&self, lifecycle: Lifecycle) {
        *self.lifecycle.lock() = lifecycle;
    }

    /// Moves `Running` to `Throttled`. Returns whether the state changed.
    pub fn throttle(&self) -> bool {
        self.transition(Lifecycle::Running, Lifecycle::Throttled)
    }

    /// Moves `Throttled` back to `Running`. Returns whether the state
    /// changed.
    pub fn unthrottle(&self) -> bool {
        self.transition(Lifecycle::Throttled, Lifecycle::Running)
    }

    /// Returns whether the process is throttled.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.lifecycle() == Lifecycle::Throttled
    }

    fn transition(&self, from: Lifecycle, to: Lifecycle) -> bool {
        let mut current = self.lifecycle.lock();
        if *current == from {
            *current = to;
            true
        } else {
            false
        }
    }
}
