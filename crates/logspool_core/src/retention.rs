//! Retention engine.
//!
//! Decides which closed segments can be deleted. Three independent budgets
//! apply, composed in one [`RetentionPolicy`]:
//!
//! - **size**: the newest segments that fit in `max_total_size` are kept,
//!   everything older is over budget
//! - **age**: segments created more than `max_age` ago
//! - **commit**: segments whose every entry is at or below the committed
//!   offset (`next_offset <= committed`)
//!
//! Eligible segments are removed oldest first. Planning stops at the first
//! segment that must be retained, so the remaining offsets stay contiguous.
//! The active segment is never removed.
//!
//! A segment reopened by external tooling is left out of size accounting
//! and is protected from size and age removal, but is still removed once
//! fully committed.

use crate::types::SegmentInfo;
use std::fmt;

/// Why a segment is eligible for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetentionCause {
    /// Over the total size budget.
    Size,
    /// Older than the retention age.
    Age,
    /// Fully committed.
    Committed,
}

impl fmt::Display for RetentionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Size => "size",
            Self::Age => "age",
            Self::Committed => "committed",
        })
    }
}

/// Budgets evaluated by one retention pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Total size budget in bytes.
    pub max_total_size: u64,
    /// Maximum segment age in milliseconds.
    pub max_age_ms: u64,
    /// Highest committed offset, if any.
    pub committed_offset: Option<u64>,
}

/// A segment chosen for removal and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionCandidate {
    /// Base offset of the segment.
    pub base_offset: u64,
    /// Exclusive end offset of the segment.
    pub next_offset: u64,
    /// Data file size in bytes.
    pub size: u64,
    /// Every budget the segment violates.
    pub causes: Vec<RetentionCause>,
}

/// Evaluates a [`RetentionPolicy`] against a snapshot of segments.
#[derive(Debug, Clone, Copy)]
pub struct RetentionEngine {
    policy: RetentionPolicy,
}

impl RetentionEngine {
    /// Creates an engine for one pass.
    #[must_use]
    pub const fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    /// Returns the segments to remove, oldest first.
    ///
    /// `segments` must be ordered by base offset.
    #[must_use]
    pub fn plan(&self, segments: &[SegmentInfo], now_ms: u64) -> Vec<RetentionCandidate> {
        let over_size = self.size_violations(segments);

        let mut plan = Vec::new();
        for (segment, over_size) in segments.iter().zip(over_size) {
            if segment.active {
                break;
            }
            let causes = self.causes(segment, over_size, now_ms);
            if causes.is_empty() {
                break;
            }
            plan.push(RetentionCandidate {
                base_offset: segment.base_offset,
                next_offset: segment.next_offset,
                size: segment.size,
                causes,
            });
        }
        plan
    }

    /// Marks each segment whose size, plus the size of everything newer,
    /// exceeds the budget.
    fn size_violations(&self, segments: &[SegmentInfo]) -> Vec<bool> {
        let mut over = vec![false; segments.len()];
        let mut accumulated: u64 = 0;
        for (i, segment) in segments.iter().enumerate().rev() {
            if segment.reopened {
                continue;
            }
            accumulated = accumulated.saturating_add(segment.size);
            over[i] = !segment.active && accumulated > self.policy.max_total_size;
        }
        over
    }

    fn causes(&self, segment: &SegmentInfo, over_size: bool, now_ms: u64) -> Vec<RetentionCause> {
        let mut causes = Vec::new();
        if over_size {
            causes.push(RetentionCause::Size);
        }
        if !segment.reopened
            && now_ms.saturating_sub(segment.created_at) > self.policy.max_age_ms
        {
            causes.push(RetentionCause::Age);
        }
        if self
            .policy
            .committed_offset
            .is_some_and(|committed| segment.next_offset <= committed)
        {
            causes.push(RetentionCause::Committed);
        }
        causes
    }
}
