//! Clock abstraction for determinism.

use chrono::{DateTime, Utc};

use crate::epoch::EpochMillis;

/// Abstraction over system time for deterministic behavior.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current time in epoch milliseconds.
    fn now_millis(&self) -> EpochMillis {
        EpochMillis::from(self.now())
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
