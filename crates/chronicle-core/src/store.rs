//! The append-only event log contract.

pub mod memory;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::epoch::EpochMillis;
use crate::error::{Error, Result};

pub use memory::InMemoryStore;

/// Stored form of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Aggregate version of the event.
    pub version: i64,
    /// When the event took place.
    pub at: EpochMillis,
    /// Envelope bytes.
    pub data: Vec<u8>,
}

/// Records of one aggregate, ascending by version.
pub type History = Vec<Record>;

/// Per-aggregate append-only log.
///
/// Implementations must:
///
/// - apply a `save` batch atomically, rejecting the whole batch with
///   `DuplicateVersion` if any `(aggregate_id, version)` already exists or
///   repeats within the batch;
/// - treat `up_to_version == 0` as unbounded and otherwise return only
///   records with `version <= up_to_version`;
/// - return histories sorted ascending, and `NotFound` instead of an empty
///   history;
/// - wrap their I/O in [`Context::run`] so cancellation is honoured.
#[async_trait]
pub trait Store: Send + Sync {
    /// Appends `records` to the log of `aggregate_id`.
    async fn save(&self, ctx: &Context, aggregate_id: &str, records: &[Record]) -> Result<()>;

    /// Reads the log of `aggregate_id` up to and including `up_to_version`.
    async fn fetch(&self, ctx: &Context, aggregate_id: &str, up_to_version: i64)
    -> Result<History>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn save(&self, ctx: &Context, aggregate_id: &str, records: &[Record]) -> Result<()> {
        (**self).save(ctx, aggregate_id, records).await
    }

    async fn fetch(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        up_to_version: i64,
    ) -> Result<History> {
        (**self).fetch(ctx, aggregate_id, up_to_version).await
    }
}

/// Whether `version` falls inside a fetch bound (`0` means unbounded).
#[must_use]
pub fn within_bound(version: i64, up_to_version: i64) -> bool {
    up_to_version == 0 || version <= up_to_version
}

/// Rejects a batch that repeats a version.
///
/// # Errors
///
/// Returns `DuplicateVersion` naming the first repeated version.
pub fn ensure_distinct_versions(aggregate_id: &str, records: &[Record]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    match records.iter().find(|r| !seen.insert(r.version)) {
        Some(repeated) => Err(Error::duplicate_version(aggregate_id, Some(repeated.version))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(version: i64) -> Record {
        Record {
            version,
            at: EpochMillis(0),
            data: Vec::new(),
        }
    }

    #[test]
    fn test_within_bound_treats_zero_as_unbounded() {
        assert!(within_bound(100, 0));
        assert!(within_bound(3, 3));
        assert!(!within_bound(4, 3));
    }

    #[test]
    fn test_repeated_version_in_batch_is_rejected() {
        let result = ensure_distinct_versions("a", &[record(1), record(2), record(1)]);

        match result {
            Err(Error::DuplicateVersion { version, .. }) => assert_eq!(version, Some(1)),
            other => panic!("expected DuplicateVersion, got {other:?}"),
        }
        assert!(ensure_distinct_versions("a", &[record(1), record(2)]).is_ok());
    }
}
