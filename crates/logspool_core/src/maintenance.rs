//! Periodic journal maintenance.
//!
//! Flushing and retention are due every `flush_interval` and
//! `retention_interval` of *journal clock* time. [`Maintenance::tick`] runs
//! whatever is due, so tests advance a [`ManualClock`](crate::ManualClock)
//! and tick by hand; [`Maintenance::spawn`] ticks on a background thread.

use crate::clock::duration_millis;
use crate::error::CoreResult;
use crate::journal::Journal;
use crate::types::JournalState;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// What one [`Maintenance::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    /// Whether dirty segments were flushed.
    pub flushed: bool,
    /// Segments removed, if retention ran.
    pub retention: Option<usize>,
}

#[derive(Debug)]
struct Schedule {
    next_flush_at: u64,
    next_retention_at: u64,
}

/// Runs flush and retention on schedule.
#[derive(Debug)]
pub struct Maintenance {
    journal: Arc<Journal>,
    flush_interval_ms: u64,
    retention_interval_ms: u64,
    schedule: Mutex<Schedule>,
}

impl Maintenance {
    /// Creates a schedule starting now on the journal clock.
    #[must_use]
    pub fn new(journal: Arc<Journal>) -> Self {
        let flush_interval_ms = duration_millis(journal.config().flush_interval);
        let retention_interval_ms = duration_millis(journal.config().retention_interval);
        let now = journal.clock().now_millis();
        Self {
            journal,
            flush_interval_ms,
            retention_interval_ms,
            schedule: Mutex::new(Schedule {
                next_flush_at: now.saturating_add(flush_interval_ms),
                next_retention_at: now.saturating_add(retention_interval_ms),
            }),
        }
    }

    /// Returns the journal being maintained.
    #[must_use]
    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    /// Runs every task that is due.
    ///
    /// Does nothing once the journal is stopped.
    ///
    /// # Errors
    ///
    /// Returns the first task failure. Every due task still runs, and a
    /// failed task is rescheduled like a successful one.
    pub fn tick(&self) -> CoreResult<TickOutcome> {
        let mut outcome = TickOutcome::default();
        if self.journal.state() == JournalState::Stopped {
            return Ok(outcome);
        }

        let now = self.journal.clock().now_millis();
        let (flush_due, retention_due) = {
            let mut schedule = self.schedule.lock();
            let flush_due = now >= schedule.next_flush_at;
            if flush_due {
                schedule.next_flush_at = now.saturating_add(self.flush_interval_ms);
            }
            let retention_due = now >= schedule.next_retention_at;
            if retention_due {
                schedule.next_retention_at = now.saturating_add(self.retention_interval_ms);
            }
            (flush_due, retention_due)
        };

        let flushed = flush_due.then(|| self.journal.flush_dirty_logs());
        let retention = retention_due.then(|| self.journal.run_retention());

        let mut first_error = None;
        match flushed {
            Some(Ok(())) => outcome.flushed = true,
            Some(Err(e)) => first_error = Some(e),
            None => {}
        }
        match retention {
            Some(Ok(removed)) => outcome.retention = Some(removed),
            Some(Err(e)) => {
                first_error.get_or_insert(e);
            }
            None => {}
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    /// Wall-clock time between background ticks.
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.min(self.retention_interval_ms).max(1))
    }

    /// Runs [`tick`](Self::tick) on a background thread until the returned
    /// handle is stopped or dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(self) -> CoreResult<MaintenanceHandle> {
        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_signal = Arc::clone(&signal);
        let poll = self.poll_interval();

        let thread = std::thread::Builder::new()
            .name("logspool-maintenance".to_string())
            .spawn(move || {
                let (stopped, wake) = &*thread_signal;
                loop {
                    {
                        let mut stopped = stopped.lock();
                        if !*stopped {
                            wake.wait_for(&mut stopped, poll);
                        }
                        if *stopped {
                            break;
                        }
                    }
                    if let Err(e) = self.tick() {
                        tracing::error!(error = %e, "journal maintenance failed");
                    }
                }
            })?;

        Ok(MaintenanceHandle {
            signal,
            thread: Some(thread),
        })
    }
}

/// Handle to a background maintenance thread.
#[derive(Debug)]
pub struct MaintenanceHandle {
    signal: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Stops the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        {
            let (stopped, wake) = &*self.signal;
            *stopped.lock() = true;
            wake.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("journal maintenance thread panicked");
            }
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
