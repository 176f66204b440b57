//! Deadline tracking for blocking operations.
//!
//! Every blocking call in this crate carries a [`Timeout`]: an absolute
//! deadline computed once at construction. Derived timeouts clamp to a
//! parent deadline so that an inner wait (the event pump's 500 ms slice)
//! can never outlive the outer budget it serves.

// ============================================================================
// Imports
// ============================================================================

use std::time::{Duration, Instant};

// ============================================================================
// Timeout
// ============================================================================

/// An absolute deadline with the originally requested duration.
///
/// The requested duration is kept alongside the deadline so that error
/// messages can report what the caller asked for rather than what
/// remained when the deadline fired.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    /// Moment after which the timeout is expired.
    deadline: Instant,
    /// Duration requested at construction.
    duration: Duration,
}

impl Timeout {
    /// Creates a timeout expiring `duration` from now.
    #[inline]
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
            duration,
        }
    }

    /// Creates a timeout expiring `duration` from now, clamped to
    /// `parent`'s deadline.
    ///
    /// The resulting deadline is the earlier of the two; the reported
    /// [`duration`](Self::duration) stays the requested one.
    #[inline]
    #[must_use]
    pub fn with_parent(duration: Duration, parent: &Timeout) -> Self {
        let deadline = Instant::now() + duration;
        Self {
            deadline: deadline.min(parent.deadline),
            duration,
        }
    }

    /// Returns the duration requested at construction.
    #[inline]
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns `true` once the deadline has passed.
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Returns the time left until the deadline, zero if expired.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

// ============================================================================
// Tests
// ============================================================================
