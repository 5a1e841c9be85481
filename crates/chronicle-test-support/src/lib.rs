//! Shared test stores, clocks and the store conformance suite for Chronicle.

mod clock;
pub mod conformance;
mod store;

use chronicle_core::epoch::EpochMillis;
use chronicle_core::store::Record;

pub use clock::{FixedClock, SteppingClock};
pub use store::{EmptyStore, FailingStore, RecordingStore};

/// A fresh aggregate id, unique per call, so tests sharing a store never
/// collide.
#[must_use]
pub fn unique_aggregate_id() -> String {
    format!("agg-{}", uuid::Uuid::now_v7())
}

/// A record at `version` with a timestamp and payload derived from the
/// version, so equal versions always produce equal records.
#[must_use]
pub fn record(version: i64) -> Record {
    Record {
        version,
        at: EpochMillis(1_700_000_000_000 + version),
        data: format!(r#"{{"t":"Numbered","d":{{"n":{version}}}}}"#).into_bytes(),
    }
}

/// A record at `version` stamped `at`, with the same payload as
/// [`record`].
#[must_use]
pub fn record_at(version: i64, at: i64) -> Record {
    Record {
        at: EpochMillis(at),
        ..record(version)
    }
}

/// Records for every version in `versions`, in the given order.
#[must_use]
pub fn records(versions: impl IntoIterator<Item = i64>) -> Vec<Record> {
    versions.into_iter().map(record).collect()
}
