//! Millisecond epoch timestamps.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch. All persisted times use this unit;
/// sub-millisecond precision is truncated on conversion.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EpochMillis(pub i64);

impl EpochMillis {
    /// The current system time.
    #[must_use]
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// Returns the raw millisecond count.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Converts back to a `DateTime<Utc>`. Values outside chrono's range
    /// saturate to the Unix epoch.
    #[must_use]
    pub fn to_datetime(self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl From<i64> for EpochMillis {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl From<DateTime<Utc>> for EpochMillis {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at.timestamp_millis())
    }
}

impl From<EpochMillis> for i64 {
    fn from(at: EpochMillis) -> Self {
        at.0
    }
}

impl From<EpochMillis> for DateTime<Utc> {
    fn from(at: EpochMillis) -> Self {
        at.to_datetime()
    }
}

impl fmt::Display for EpochMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
