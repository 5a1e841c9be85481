//! Test clocks: deterministic `Clock` implementations for tests.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use chronicle_core::clock::Clock;
use chronicle_core::epoch::EpochMillis;

/// A clock that always returns a fixed point in time.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// A clock frozen at `millis` since the Unix epoch.
    #[must_use]
    pub fn at_millis(millis: i64) -> Self {
        Self(EpochMillis(millis).to_datetime())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A clock that advances by a fixed step every time it is read.
#[derive(Debug)]
pub struct SteppingClock {
    next: AtomicI64,
    step: i64,
}

impl SteppingClock {
    /// Starts at `start` millis and advances by `step` millis per reading.
    #[must_use]
    pub fn new(start: i64, step: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        EpochMillis(self.next.fetch_add(self.step, Ordering::SeqCst)).to_datetime()
    }
}
