//! Wall-clock sources.
//!
//! Semaphore entries are scored with the *client's* notion of the current
//! time, so the clock is injected rather than read from the environment.
//! Tests use [`ManualClock`] (and [`SkewedClock`] to model a host whose clock
//! runs ahead of or behind its peers).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of the current time as Unix milliseconds.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Convert a [`Duration`] to whole milliseconds, saturating at `i64::MAX`.
pub fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// The host's system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same timeline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock reading `start_millis`.
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(duration_millis(by), Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// A view of this timeline shifted by `offset_millis` (negative lags behind).
    #[must_use]
    pub fn skewed(&self, offset_millis: i64) -> SkewedClock {
        SkewedClock {
            base: self.clone(),
            offset_millis,
        }
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// A [`ManualClock`] read through a fixed offset.
#[derive(Debug, Clone)]
pub struct SkewedClock {
    base: ManualClock,
    offset_millis: i64,
}

impl Clock for SkewedClock {
    fn now_millis(&self) -> i64 {
        self.base.now_millis().saturating_add(self.offset_millis)
    }
}
